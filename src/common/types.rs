//! Market-facing types shared by the strategy and market implementations

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::errors::StrategyError;

/// Trade side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// The other side of the book
    pub fn opposite(self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, TradeSide::Buy)
    }

    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A `BASE-QUOTE` trading pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Asset spent when trading on `side`
    pub fn spent_asset(&self, side: TradeSide) -> &str {
        match side {
            TradeSide::Buy => &self.quote,
            TradeSide::Sell => &self.base,
        }
    }
}

impl FromStr for TradingPair {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('-') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('-') =>
            {
                Ok(Self::new(base.to_uppercase(), quote.to_uppercase()))
            }
            _ => Err(StrategyError::InvalidTradingPair(s.to_string())),
        }
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// Order type used for submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    LimitMaker,
}

/// Exchange-assigned order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order submission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub pair: TradingPair,
    pub side: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
}

impl OrderRequest {
    /// Notional value in quote currency
    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }
}

/// Order lifecycle event pushed by a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// Order completely filled
    Filled {
        order_id: OrderId,
        side: TradeSide,
        amount: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    },
    /// Order failed on the exchange
    Failed { order_id: OrderId, reason: String },
    /// Order cancelled before filling
    Cancelled { order_id: OrderId },
    /// Order expired before filling
    Expired { order_id: OrderId },
}

impl OrderEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            OrderEvent::Filled { order_id, .. }
            | OrderEvent::Failed { order_id, .. }
            | OrderEvent::Cancelled { order_id }
            | OrderEvent::Expired { order_id } => order_id,
        }
    }

    /// Only an explicit failure counts as unsuccessful; cancel and expire
    /// still release the pending order.
    pub fn is_success(&self) -> bool {
        !matches!(self, OrderEvent::Failed { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Filled { .. } => "filled",
            OrderEvent::Failed { .. } => "failed",
            OrderEvent::Cancelled { .. } => "cancelled",
            OrderEvent::Expired { .. } => "expired",
        }
    }
}

/// Completion observed for a tracked order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCompletion {
    pub order_id: OrderId,
    pub succeeded: bool,
    pub detail: String,
}

impl OrderCompletion {
    pub fn from_event(event: &OrderEvent) -> Self {
        let detail = match event {
            OrderEvent::Failed { reason, .. } => reason.clone(),
            other => other.kind().to_string(),
        };
        Self {
            order_id: event.order_id().clone(),
            succeeded: event.is_success(),
            detail,
        }
    }

    pub fn failed(order_id: OrderId, detail: impl Into<String>) -> Self {
        Self {
            order_id,
            succeeded: false,
            detail: detail.into(),
        }
    }
}
