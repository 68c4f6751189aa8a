use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::common::errors::Result;
use crate::strategy::types::TradeState;

/// Durable store for the last traded side and price
///
/// Implementations must be crash-consistent: after a failed or interrupted
/// `save` the previously saved state is still loadable.
pub trait StatePersistence: Send + Sync {
    /// Previously saved state, or `None` if nothing was saved yet
    fn load(&self) -> Result<Option<TradeState>>;

    /// Overwrite the saved state
    fn save(&self, state: &TradeState) -> Result<()>;
}

/// Boxed persistence for dynamic dispatch
pub type BoxedStatePersistence = Box<dyn StatePersistence>;

/// Source of conversion rates between two assets
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Price of one unit of `asset` expressed in `reference`
    async fn fetch_rate(&self, asset: &str, reference: &str) -> Result<Decimal>;
}
