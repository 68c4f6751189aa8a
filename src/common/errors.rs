//! Error types for the strategy

use thiserror::Error;

use super::types::OrderId;

/// Result type alias using our StrategyError
pub type Result<T> = std::result::Result<T, StrategyError>;

/// Main error type for strategy operations
#[derive(Error, Debug)]
pub enum StrategyError {
    /// Market collaborator errors (quotes, balances, order placement)
    #[error("Market error: {0}")]
    Market(String),

    /// Order placement was rejected before an order id was assigned
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// A submission was attempted while another order is still outstanding
    #[error("Order {0} is still outstanding")]
    OrderOutstanding(OrderId),

    /// Invalid trading pair notation
    #[error("Invalid trading pair: {0}")]
    InvalidTradingPair(String),

    /// Trade state could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// File system errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The strategy was stopped while an operation was in flight
    #[error("Strategy stopped")]
    Stopped,

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for StrategyError {
    fn from(err: config::ConfigError) -> Self {
        StrategyError::Configuration(err.to_string())
    }
}
