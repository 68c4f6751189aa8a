use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{OrderId, TradeSide};

/// Side and price of the most recently submitted trade
///
/// This is the only state that survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeState {
    pub last_side: TradeSide,
    pub last_price: Decimal,
}

impl TradeState {
    pub fn new(last_side: TradeSide, last_price: Decimal) -> Self {
        Self {
            last_side,
            last_price,
        }
    }

    /// A zero price means no trade has been recorded yet
    pub fn has_baseline(&self) -> bool {
        !self.last_price.is_zero()
    }

    /// The strategy strictly alternates sides
    pub fn next_side(&self) -> TradeSide {
        self.last_side.opposite()
    }
}

/// A single candidate trade derived from one market snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub side: TradeSide,
    /// Price the market reports for the requested amount
    pub quote_price: Decimal,
    /// Price to submit the order at
    pub order_price: Decimal,
    /// Base asset amount
    pub amount: Decimal,
}

impl Proposal {
    pub fn is_executable(&self) -> bool {
        self.amount > Decimal::ZERO && self.order_price > Decimal::ZERO
    }
}

impl std::fmt::Display for Proposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Side: {}  Quote Price: {}  Order Price: {}  Amount: {}",
            self.side, self.quote_price, self.order_price, self.amount
        )
    }
}

/// Where the execution state machine is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Idle,
    AwaitingPriorFill,
    Evaluating,
    Submitting,
    Stopped,
}

/// Why a cycle ended without submitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    PriorOrderFailed { order_id: OrderId, detail: String },
    IncompleteProposal,
    NonPositiveAmount,
    SideMismatch { proposal: TradeSide, last: TradeSide },
    BelowThreshold { profitability: Decimal, threshold: Decimal },
    BelowPriceFloor { price: Decimal, floor: Decimal },
    InsufficientBalance { asset: String, available: Decimal, required: Decimal },
    SubmissionFailed(String),
    MarketError(String),
    /// The last trade state change has not reached the store yet
    StateNotPersisted(String),
}

/// Result of one decision cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Submitted {
        order_id: OrderId,
        side: TradeSide,
        price: Decimal,
        amount: Decimal,
    },
    /// Trend gate asked to keep watching
    Deferred { profitability: Decimal },
    Skipped(SkipReason),
    /// Shutdown interrupted the cycle
    Cancelled,
}

impl CycleOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, CycleOutcome::Submitted { .. })
    }
}
