//! SwingTrader Library
//!
//! An alternating single-market taker strategy: it buys, waits for a
//! profitable exit, sells, waits for a profitable re-entry, and so on, with
//! at most one order in flight and the last trade persisted across restarts.

pub mod common;
pub mod config;
pub mod market;
pub mod strategy;

// Re-export commonly used types
pub use common::errors::{Result, StrategyError};
pub use common::traits::{Market, SharedMarket};
pub use common::types::{
    OrderCompletion, OrderEvent, OrderId, OrderRequest, OrderType, TradeSide, TradingPair,
};
pub use config::types::AppConfig;
pub use market::{SimulatedMarket, SyntheticPriceFeed};

// Strategy types
pub use strategy::{
    profit_pct, BoxedStatePersistence, CycleOutcome, ExecutionStateMachine, InMemoryStatePersistence,
    JsonFileStatePersistence, PriceAdjuster, Proposal, ProposalBuilder, SkipReason,
    StatePersistence, Strategy, TradeState, TrendGate,
};
