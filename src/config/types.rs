//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::errors::{Result, StrategyError};
use crate::common::types::{TradeSide, TradingPair};
use crate::strategy::TradeState;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Strategy parameters
    pub strategy: StrategyConfig,
    /// Where the trade state document lives
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Quote-to-reference rate polling (optional)
    #[serde(default)]
    pub reference_rate: Option<ReferenceRateConfig>,
    /// Paper market used by the binary
    #[serde(default)]
    pub simulated_market: SimulatedMarketConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.simulated_market.validate()
    }
}

/// Strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Identity of the running strategy; keys the persisted state document
    #[serde(default = "default_strategy_name")]
    pub name: String,
    /// Traded pair in `BASE-QUOTE` notation
    pub trading_pair: String,
    /// Base asset amount per order
    pub order_amount: Decimal,
    /// Minimum profitability (percent) required to sell after a buy
    #[serde(default = "default_min_profitability")]
    pub min_sell_profitability: Decimal,
    /// Minimum profitability (percent) required to buy after a sell
    #[serde(default = "default_min_profitability")]
    pub min_buy_profitability: Decimal,
    /// Sells are only submitted above this absolute price
    #[serde(default)]
    pub min_sell_price: Decimal,
    /// Multiplier applied to buy amounts to reduce underfill
    #[serde(default = "default_buy_amount_margin")]
    pub buy_amount_margin: Decimal,
    /// Re-check interval while profitability is flat or improving
    #[serde(default = "default_fast_poll_interval")]
    pub fast_poll_interval_secs: u64,
    /// Re-check interval once profitability declines
    #[serde(default = "default_slow_poll_interval")]
    pub slow_poll_interval_secs: u64,
    /// Initial last trade price when no state document exists (0 = no baseline)
    #[serde(default)]
    pub previous_trade_price: Decimal,
    /// Initial last trade side when no state document exists
    #[serde(default = "default_previous_side_buy")]
    pub is_previous_side_trade_buy: bool,
}

impl StrategyConfig {
    pub fn trading_pair(&self) -> Result<TradingPair> {
        self.trading_pair.parse()
    }

    pub fn fast_poll_interval(&self) -> Duration {
        Duration::from_secs(self.fast_poll_interval_secs)
    }

    pub fn slow_poll_interval(&self) -> Duration {
        Duration::from_secs(self.slow_poll_interval_secs)
    }

    /// Trade state used when nothing has been persisted yet
    pub fn initial_trade_state(&self) -> TradeState {
        TradeState::new(
            TradeSide::from_is_buy(self.is_previous_side_trade_buy),
            self.previous_trade_price,
        )
    }

    pub fn validate(&self) -> Result<()> {
        self.trading_pair()?;
        if self.name.trim().is_empty() {
            return Err(StrategyError::Configuration(
                "strategy.name must not be empty".to_string(),
            ));
        }
        if self.order_amount <= Decimal::ZERO {
            return Err(StrategyError::Configuration(format!(
                "strategy.order_amount must be positive, got {}",
                self.order_amount
            )));
        }
        if self.buy_amount_margin < Decimal::ONE {
            return Err(StrategyError::Configuration(format!(
                "strategy.buy_amount_margin must be >= 1, got {}",
                self.buy_amount_margin
            )));
        }
        if self.previous_trade_price < Decimal::ZERO {
            return Err(StrategyError::Configuration(
                "strategy.previous_trade_price must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_strategy_name() -> String {
    "swing_1".to_string()
}

fn default_min_profitability() -> Decimal {
    dec!(0.2)
}

fn default_buy_amount_margin() -> Decimal {
    dec!(1.002)
}

fn default_fast_poll_interval() -> u64 {
    5
}

fn default_slow_poll_interval() -> u64 {
    30
}

fn default_previous_side_buy() -> bool {
    true
}

/// Trade state persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding one JSON document per strategy name
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl PersistenceConfig {
    pub fn state_file(&self, strategy_name: &str) -> PathBuf {
        PathBuf::from(&self.state_dir).join(format!("{}.json", strategy_name))
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> String {
    "conf".to_string()
}

/// Quote-to-reference rate polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceRateConfig {
    /// Reference asset the quote currency is priced in
    #[serde(default = "default_reference_asset")]
    pub asset: String,
    #[serde(default = "default_rate_interval")]
    pub interval_secs: u64,
    /// Pause after a failed fetch
    #[serde(default = "default_rate_error_backoff")]
    pub error_backoff_ms: u64,
}

impl Default for ReferenceRateConfig {
    fn default() -> Self {
        Self {
            asset: default_reference_asset(),
            interval_secs: default_rate_interval(),
            error_backoff_ms: default_rate_error_backoff(),
        }
    }
}

fn default_reference_asset() -> String {
    "WETH".to_string()
}

fn default_rate_interval() -> u64 {
    300
}

fn default_rate_error_backoff() -> u64 {
    500
}

/// Paper market settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedMarketConfig {
    #[serde(default = "default_market_name")]
    pub name: String,
    /// Starting mid price
    #[serde(default = "default_mid_price")]
    pub mid_price: Decimal,
    /// Half spread around the mid, in percent
    #[serde(default = "default_spread_pct")]
    pub spread_pct: Decimal,
    #[serde(default = "default_price_tick")]
    pub price_tick: Decimal,
    #[serde(default = "default_amount_lot")]
    pub amount_lot: Decimal,
    #[serde(default = "default_base_balance")]
    pub base_balance: Decimal,
    #[serde(default = "default_quote_balance")]
    pub quote_balance: Decimal,
    /// Delay between acceptance and fill
    #[serde(default = "default_fill_delay")]
    pub fill_delay_ms: u64,
    /// Peak deviation of the synthetic price feed, in percent of the start price
    #[serde(default = "default_price_amplitude")]
    pub price_amplitude_pct: Decimal,
    /// Period of the synthetic price oscillation
    #[serde(default = "default_price_period")]
    pub price_period_secs: u64,
    #[serde(default = "default_price_update")]
    pub price_update_ms: u64,
}

impl SimulatedMarketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mid_price <= Decimal::ZERO {
            return Err(StrategyError::Configuration(
                "simulated_market.mid_price must be positive".to_string(),
            ));
        }
        if self.price_tick <= Decimal::ZERO || self.amount_lot <= Decimal::ZERO {
            return Err(StrategyError::Configuration(
                "simulated_market tick and lot sizes must be positive".to_string(),
            ));
        }
        if self.spread_pct < Decimal::ZERO || self.spread_pct >= dec!(100) {
            return Err(StrategyError::Configuration(
                "simulated_market.spread_pct must be in [0, 100)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SimulatedMarketConfig {
    fn default() -> Self {
        Self {
            name: default_market_name(),
            mid_price: default_mid_price(),
            spread_pct: default_spread_pct(),
            price_tick: default_price_tick(),
            amount_lot: default_amount_lot(),
            base_balance: default_base_balance(),
            quote_balance: default_quote_balance(),
            fill_delay_ms: default_fill_delay(),
            price_amplitude_pct: default_price_amplitude(),
            price_period_secs: default_price_period(),
            price_update_ms: default_price_update(),
        }
    }
}

fn default_market_name() -> String {
    "paper".to_string()
}

fn default_mid_price() -> Decimal {
    dec!(100)
}

fn default_spread_pct() -> Decimal {
    dec!(0.05)
}

fn default_price_tick() -> Decimal {
    dec!(0.01)
}

fn default_amount_lot() -> Decimal {
    dec!(0.001)
}

fn default_base_balance() -> Decimal {
    dec!(10)
}

fn default_quote_balance() -> Decimal {
    dec!(1000)
}

fn default_fill_delay() -> u64 {
    250
}

fn default_price_amplitude() -> Decimal {
    dec!(2)
}

fn default_price_period() -> u64 {
    600
}

fn default_price_update() -> u64 {
    1000
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Interval between scheduler ticks in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval() -> u64 {
    1000
}
