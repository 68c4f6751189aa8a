//! Types, traits and plumbing shared across the crate

pub mod channels;
pub mod errors;
pub mod shutdown;
pub mod traits;
pub mod types;
