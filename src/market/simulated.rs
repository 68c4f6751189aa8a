//! Paper market for dry runs and tests.
//!
//! `SimulatedMarket` quotes around a mid price with a fixed half spread, fills
//! every accepted order at its limit price after a configurable delay and
//! pushes the resulting order events over the strategy's event channel.
//!
//! `SyntheticPriceFeed` moves the mid price along a sine wave so the strategy
//! sees profitability rise and fall.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::errors::{Result, StrategyError};
use crate::common::shutdown::ShutdownListener;
use crate::common::traits::Market;
use crate::common::types::{OrderEvent, OrderId, OrderRequest, OrderType, TradeSide, TradingPair};
use crate::config::SimulatedMarketConfig;

/// Order counters shared with the fill tasks
#[derive(Debug, Default)]
struct OrderCounters {
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    filled: AtomicUsize,
    failed: AtomicUsize,
}

/// Single-pair paper market
pub struct SimulatedMarket {
    config: SimulatedMarketConfig,
    pair: TradingPair,
    mid_price: RwLock<Decimal>,
    /// Extra pairs quoted at a fixed rate, e.g. for reference conversions
    rates: RwLock<HashMap<TradingPair, Decimal>>,
    balances: Arc<Mutex<HashMap<String, Decimal>>>,
    events: mpsc::Sender<OrderEvent>,
    next_order_id: AtomicU64,
    counters: Arc<OrderCounters>,
    placed: Mutex<Vec<OrderRequest>>,
    fail_next_submission: AtomicBool,
    fail_next_fill: AtomicBool,
    quotes_available: AtomicBool,
    ready: AtomicBool,
}

impl SimulatedMarket {
    pub fn new(
        config: SimulatedMarketConfig,
        pair: TradingPair,
        events: mpsc::Sender<OrderEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let mut balances = HashMap::new();
        balances.insert(pair.base.clone(), config.base_balance);
        balances.insert(pair.quote.clone(), config.quote_balance);

        Ok(Self {
            mid_price: RwLock::new(config.mid_price),
            config,
            pair,
            rates: RwLock::new(HashMap::new()),
            balances: Arc::new(Mutex::new(balances)),
            events,
            next_order_id: AtomicU64::new(1),
            counters: Arc::new(OrderCounters::default()),
            placed: Mutex::new(Vec::new()),
            fail_next_submission: AtomicBool::new(false),
            fail_next_fill: AtomicBool::new(false),
            quotes_available: AtomicBool::new(true),
            ready: AtomicBool::new(true),
        })
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub fn mid_price(&self) -> Decimal {
        *self.mid_price.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_mid_price(&self, price: Decimal) {
        *self.mid_price.write().unwrap_or_else(|e| e.into_inner()) = price;
    }

    /// Quote `pair` at a fixed rate on both sides
    pub fn set_rate(&self, pair: TradingPair, rate: Decimal) {
        self.rates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pair, rate);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Make the book unable to price orders
    pub fn set_quotes_available(&self, available: bool) {
        self.quotes_available.store(available, Ordering::SeqCst);
    }

    /// Reject the next `place_order` call outright
    pub fn fail_next_submission(&self) {
        self.fail_next_submission.store(true, Ordering::SeqCst);
    }

    /// Accept the next order but report it as failed instead of filled
    pub fn fail_next_fill(&self) {
        self.fail_next_fill.store(true, Ordering::SeqCst);
    }

    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        self.balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset.to_string(), amount);
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Every accepted order, in submission order
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn outstanding_orders(&self) -> usize {
        self.counters.outstanding.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously unfilled orders seen so far
    pub fn max_outstanding_orders(&self) -> usize {
        self.counters.max_outstanding.load(Ordering::SeqCst)
    }

    pub fn filled_orders(&self) -> usize {
        self.counters.filled.load(Ordering::SeqCst)
    }

    pub fn failed_orders(&self) -> usize {
        self.counters.failed.load(Ordering::SeqCst)
    }

    fn price_for(&self, pair: &TradingPair, side: TradeSide) -> Option<Decimal> {
        if *pair != self.pair {
            return self
                .rates
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(pair)
                .copied();
        }

        let half_spread = self.config.spread_pct / dec!(100);
        let mid = self.mid_price();
        let price = match side {
            TradeSide::Buy => mid * (Decimal::ONE + half_spread),
            TradeSide::Sell => mid * (Decimal::ONE - half_spread),
        };
        Some(price)
    }

    fn spawn_fill(&self, order_id: OrderId, request: OrderRequest, fail: bool) {
        let delay = Duration::from_millis(self.config.fill_delay_ms);
        let events = self.events.clone();
        let balances = self.balances.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let event = if fail {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                OrderEvent::Failed {
                    order_id,
                    reason: "simulated failure".to_string(),
                }
            } else {
                {
                    let mut balances = balances.lock().unwrap_or_else(|e| e.into_inner());
                    let notional = request.notional();
                    let (base_delta, quote_delta) = match request.side {
                        TradeSide::Buy => (request.amount, -notional),
                        TradeSide::Sell => (-request.amount, notional),
                    };
                    *balances.entry(request.pair.base.clone()).or_default() += base_delta;
                    *balances.entry(request.pair.quote.clone()).or_default() += quote_delta;
                }
                counters.filled.fetch_add(1, Ordering::SeqCst);
                OrderEvent::Filled {
                    order_id,
                    side: request.side,
                    amount: request.amount,
                    price: request.price,
                    timestamp: Utc::now(),
                }
            };

            counters.outstanding.fetch_sub(1, Ordering::SeqCst);
            debug!(order_id = %event.order_id(), kind = event.kind(), "Simulated order completed");
            if events.send(event).await.is_err() {
                warn!("Order event receiver dropped");
            }
        });
    }
}

#[async_trait]
impl Market for SimulatedMarket {
    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn get_quote_price(
        &self,
        pair: &TradingPair,
        side: TradeSide,
        _amount: Decimal,
    ) -> Result<Option<Decimal>> {
        if !self.quotes_available.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.price_for(pair, side))
    }

    async fn get_order_price(
        &self,
        pair: &TradingPair,
        side: TradeSide,
        amount: Decimal,
    ) -> Result<Option<Decimal>> {
        self.get_quote_price(pair, side, amount).await
    }

    fn quantize_order_amount(&self, _pair: &TradingPair, amount: Decimal) -> Decimal {
        quantize_down(amount, self.config.amount_lot)
    }

    fn quantize_order_price(&self, _pair: &TradingPair, price: Decimal) -> Decimal {
        quantize_down(price, self.config.price_tick)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId> {
        if !self.ready() {
            return Err(StrategyError::Market(format!("{} is not connected", self.config.name)));
        }
        if self.fail_next_submission.swap(false, Ordering::SeqCst) {
            return Err(StrategyError::OrderRejected("simulated rejection".to_string()));
        }
        if request.pair != self.pair {
            return Err(StrategyError::InvalidTradingPair(request.pair.to_string()));
        }
        if request.amount <= Decimal::ZERO || request.price <= Decimal::ZERO {
            return Err(StrategyError::OrderRejected(format!(
                "invalid amount {} or price {}",
                request.amount, request.price
            )));
        }

        let asset = request.pair.spent_asset(request.side);
        let required = match request.side {
            TradeSide::Buy => request.notional(),
            TradeSide::Sell => request.amount,
        };
        let available = self.balance(asset);
        if available < required {
            return Err(StrategyError::OrderRejected(format!(
                "insufficient {}: {} < {}",
                asset, available, required
            )));
        }

        let order_id = OrderId::new(format!(
            "{}-{}",
            self.config.name,
            self.next_order_id.fetch_add(1, Ordering::SeqCst)
        ));
        let outstanding = self.counters.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_outstanding
            .fetch_max(outstanding, Ordering::SeqCst);
        self.placed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        info!(
            %order_id,
            side = %request.side,
            amount = %request.amount,
            price = %request.price,
            "Simulated order accepted"
        );
        let fail = self.fail_next_fill.swap(false, Ordering::SeqCst);
        self.spawn_fill(order_id.clone(), request.clone(), fail);
        Ok(order_id)
    }

    fn taker_order_type(&self) -> OrderType {
        OrderType::Market
    }

    async fn get_available_balance(&self, asset: &str) -> Result<Decimal> {
        Ok(self.balance(asset))
    }
}

fn quantize_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}

/// Oscillates the simulated mid price around its starting value
pub struct SyntheticPriceFeed {
    market: Arc<SimulatedMarket>,
    base_price: f64,
    amplitude: f64,
    period: Duration,
    update_interval: Duration,
}

impl SyntheticPriceFeed {
    pub fn new(market: Arc<SimulatedMarket>, config: &SimulatedMarketConfig) -> Self {
        Self {
            market,
            base_price: config.mid_price.to_f64().unwrap_or(0.0),
            amplitude: config.price_amplitude_pct.to_f64().unwrap_or(0.0) / 100.0,
            period: Duration::from_secs(config.price_period_secs.max(1)),
            update_interval: Duration::from_millis(config.price_update_ms.max(1)),
        }
    }

    /// Mid price `elapsed` after the feed started
    pub fn price_at(&self, elapsed: Duration) -> Decimal {
        let phase = elapsed.as_secs_f64() / self.period.as_secs_f64() * std::f64::consts::TAU;
        let price = self.base_price * (1.0 + self.amplitude * phase.sin());
        Decimal::from_f64(price)
            .map(|p| p.round_dp(8))
            .unwrap_or_else(|| self.market.mid_price())
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: ShutdownListener) {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.update_interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let price = self.price_at(started.elapsed());
                    self.market.set_mid_price(price);
                    debug!(%price, "Mid price updated");
                }
            }
        }

        debug!("Price feed stopped");
    }
}
