//! Trait definitions for market collaborators

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::errors::Result;
use super::types::{OrderId, OrderRequest, OrderType, TradeSide, TradingPair};

/// Trading venue capability consumed by the strategy
///
/// Implementations push order lifecycle events (fill, failure, cancel,
/// expiry) over the channel they were constructed with; the trait itself
/// only covers the request/response side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Market: Send + Sync {
    /// Display name of the venue
    fn name(&self) -> String;

    /// Whether the venue is connected and able to quote and trade
    fn ready(&self) -> bool {
        true
    }

    /// Price the market reports for trading `amount` on `side`
    ///
    /// Returns `Ok(None)` when the book cannot fill the requested amount.
    async fn get_quote_price(
        &self,
        pair: &TradingPair,
        side: TradeSide,
        amount: Decimal,
    ) -> Result<Option<Decimal>>;

    /// Price to submit an order at for `amount` on `side`
    async fn get_order_price(
        &self,
        pair: &TradingPair,
        side: TradeSide,
        amount: Decimal,
    ) -> Result<Option<Decimal>>;

    /// Round an amount down to the venue's lot size
    fn quantize_order_amount(&self, pair: &TradingPair, amount: Decimal) -> Decimal;

    /// Round a price to the venue's tick size
    fn quantize_order_price(&self, pair: &TradingPair, price: Decimal) -> Decimal;

    /// Submit an order, returning the venue's order id
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId>;

    /// Order type that crosses the book on this venue
    fn taker_order_type(&self) -> OrderType;

    /// Balance of `asset` not locked in open orders
    async fn get_available_balance(&self, asset: &str) -> Result<Decimal>;
}

/// Shared market handle for dynamic dispatch
pub type SharedMarket = Arc<dyn Market>;
