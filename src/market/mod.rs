//! Market implementations

pub mod simulated;

pub use simulated::{SimulatedMarket, SyntheticPriceFeed};
