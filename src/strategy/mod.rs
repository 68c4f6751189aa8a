//! Strategy module for trade decision making
//!
//! An alternating taker strategy on a single market: after a buy it looks for
//! a profitable sell, after a sell for a profitable buy, and never has more
//! than one order in flight.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ASYNC (background)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Order event listener                                       │
//! │    - Receives fill / failure / cancel / expiry events       │
//! │    - Resolves the pending order's completion signal         │
//! │  RatePoller                                                 │
//! │    - Refreshes the quote → reference rate every 5 minutes   │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CYCLE (one at a time)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Strategy.on_tick()                                         │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  ExecutionStateMachine.await_prior_fill()                   │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  ProposalBuilder → PriceAdjuster                            │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  ExecutionStateMachine.execute()                            │
//! │    - profit_pct() against the last trade                    │
//! │    - TrendGate: defer while profitability improves          │
//! │    - thresholds, price floor, balance                       │
//! │    - submit, persist TradeState                             │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  adaptive sleep (fast while deferring, slow otherwise)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Strategy`]: Tick entry point, owns the cycle and background tasks
//! - [`ProposalBuilder`] / [`PriceAdjuster`]: Candidate trade from live quotes
//! - [`profit_pct`]: Direction-aware profitability against the last trade
//! - [`TrendGate`]: Execute-or-defer decision and next polling interval
//! - [`ExecutionStateMachine`]: Serialized submission and completion tracking
//! - [`StatePersistence`]: Durable last side and price
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = create_order_event_channel();
//! let market: SharedMarket = Arc::new(SimulatedMarket::new(market_config, pair, tx)?);
//! let persistence = JsonFileStatePersistence::new("conf/swing_1.json");
//!
//! let strategy = Strategy::new(&config, market, Box::new(persistence), rx, None)?;
//! strategy.start()?;
//!
//! let mut ticker = tokio::time::interval(Duration::from_secs(1));
//! loop {
//!     ticker.tick().await;
//!     strategy.on_tick(Utc::now());
//! }
//! ```

mod execution;
mod persistence;
mod profitability;
mod proposal;
mod rate_poller;
mod runner;
mod tracker;
mod traits;
mod trend;
mod types;

pub use execution::{ExecutionState, ExecutionStateMachine, ExecutionThresholds, PendingOrder};
pub use persistence::{
    InMemoryStatePersistence, JsonFileStatePersistence, PREVIOUS_SIDE_BUY_KEY,
    PREVIOUS_TRADE_PRICE_KEY,
};
pub use profitability::{profit_pct, NO_BASELINE_PROFITABILITY};
pub use proposal::{PriceAdjuster, ProposalBuilder};
pub use rate_poller::{MarketRateSource, RatePoller};
pub use runner::Strategy;
pub use tracker::OrderTracker;
pub use traits::{BoxedStatePersistence, RateSource, StatePersistence};
pub use trend::{TrendDecision, TrendGate};
pub use types::{CycleOutcome, ExecutionPhase, Proposal, SkipReason, TradeState};
