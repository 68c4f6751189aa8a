//! Common test utilities and fixtures
#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swing_trader::common::channels::create_order_event_channel;
use swing_trader::config::{ReferenceRateConfig, SimulatedMarketConfig, StrategyConfig};
use swing_trader::{
    BoxedStatePersistence, InMemoryStatePersistence, SharedMarket, SimulatedMarket, Strategy,
    TradeState, TradingPair,
};

/// Strategy parameters used across tests: ETH-USDC, one unit per order
pub fn strategy_config() -> StrategyConfig {
    StrategyConfig {
        name: "swing_test".to_string(),
        trading_pair: "ETH-USDC".to_string(),
        order_amount: dec!(1),
        min_sell_profitability: dec!(0.2),
        min_buy_profitability: dec!(0.2),
        min_sell_price: Decimal::ZERO,
        buy_amount_margin: dec!(1.002),
        fast_poll_interval_secs: 5,
        slow_poll_interval_secs: 30,
        previous_trade_price: Decimal::ZERO,
        is_previous_side_trade_buy: true,
    }
}

/// Strategy that accepts any round trip the trend gate lets through
pub fn permissive_config() -> StrategyConfig {
    StrategyConfig {
        min_sell_profitability: dec!(-10),
        min_buy_profitability: dec!(-10),
        ..strategy_config()
    }
}

/// Paper market with no spread and a fast fill
pub fn market_config(mid_price: Decimal) -> SimulatedMarketConfig {
    SimulatedMarketConfig {
        name: "paper".to_string(),
        mid_price,
        spread_pct: Decimal::ZERO,
        price_tick: dec!(0.01),
        amount_lot: dec!(0.001),
        base_balance: dec!(10),
        quote_balance: dec!(1000),
        fill_delay_ms: 20,
        ..SimulatedMarketConfig::default()
    }
}

pub fn pair() -> TradingPair {
    TradingPair::new("ETH", "USDC")
}

/// A running strategy wired to a paper market
pub struct Harness {
    pub market: Arc<SimulatedMarket>,
    pub strategy: Strategy,
}

/// Build and start a strategy on a fresh paper market
pub fn start_strategy(
    config: &StrategyConfig,
    market_config: SimulatedMarketConfig,
    persistence: BoxedStatePersistence,
    reference_rate: Option<&ReferenceRateConfig>,
) -> Harness {
    let (tx, rx) = create_order_event_channel();
    let market = Arc::new(SimulatedMarket::new(market_config, pair(), tx).expect("market"));
    let shared: SharedMarket = market.clone();
    let strategy =
        Strategy::new(config, shared, persistence, rx, reference_rate).expect("strategy");
    strategy.start().expect("start");
    Harness { market, strategy }
}

/// Harness backed by an in-memory store seeded with `state`
pub fn start_in_memory(
    config: &StrategyConfig,
    market_config: SimulatedMarketConfig,
    state: Option<TradeState>,
) -> (Harness, Arc<InMemoryStatePersistence>) {
    let store = Arc::new(match state {
        Some(state) => InMemoryStatePersistence::with_state(state),
        None => InMemoryStatePersistence::new(),
    });
    let harness = start_strategy(config, market_config, Box::new(store.clone()), None);
    (harness, store)
}

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Fresh, empty directory under the system temp dir
pub fn temp_state_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "swing_trader_{}_{}_{}",
        label,
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Sample state documents
pub mod documents {
    /// Document written by an earlier run, with unrelated settings
    pub const WITH_SETTINGS: &str = r#"{
    "strategy": "swing",
    "connector": "paper",
    "trading_pair": "ETH-USDC",
    "order_amount": 1,
    "min_sell_profitability": 0.2,
    "previous_trade_price": 0,
    "is_previous_side_trade_buy": true
}"#;

    /// Settings only, no trade state yet
    pub const SETTINGS_ONLY: &str = r#"{
    "strategy": "swing",
    "trading_pair": "ETH-USDC"
}"#;
}
