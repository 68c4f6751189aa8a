use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::common::errors::{Result, StrategyError};
use crate::common::shutdown::Shutdown;
use crate::common::traits::SharedMarket;
use crate::common::types::OrderEvent;
use crate::config::{ReferenceRateConfig, StrategyConfig};
use crate::strategy::execution::{ExecutionStateMachine, ExecutionThresholds};
use crate::strategy::proposal::{PriceAdjuster, ProposalBuilder};
use crate::strategy::rate_poller::{MarketRateSource, RatePoller};
use crate::strategy::tracker::OrderTracker;
use crate::strategy::traits::{BoxedStatePersistence, RateSource};
use crate::strategy::trend::TrendGate;
use crate::strategy::types::{CycleOutcome, SkipReason, TradeState};

/// Everything a cycle mutates; only one cycle holds it at a time
struct CycleEngine {
    builder: ProposalBuilder,
    adjuster: PriceAdjuster,
    execution: ExecutionStateMachine,
}

impl CycleEngine {
    async fn run(&mut self) -> Result<CycleOutcome> {
        if let Some(reason) = self.execution.await_prior_fill().await? {
            return Ok(CycleOutcome::Skipped(reason));
        }

        let trade_state = self.execution.trade_state();
        let mut proposal = match self.builder.build(&trade_state).await {
            Ok(Some(proposal)) => proposal,
            Ok(None) => return Ok(CycleOutcome::Skipped(SkipReason::IncompleteProposal)),
            Err(e) => {
                warn!(error = %e, "Failed to build proposal");
                return Ok(CycleOutcome::Skipped(SkipReason::MarketError(e.to_string())));
            }
        };

        self.adjuster.adjust(&mut proposal);
        self.execution.execute(proposal).await
    }
}

struct Inner {
    name: String,
    market: SharedMarket,
    engine: tokio::sync::Mutex<CycleEngine>,
    tracker: Arc<OrderTracker>,
    shutdown: Shutdown,
    cycle_task: Mutex<Option<JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    events: Mutex<Option<mpsc::Receiver<OrderEvent>>>,
    rate_poller: Mutex<Option<RatePoller>>,
    rate: Option<Arc<RwLock<Option<Decimal>>>>,
}

/// Alternating taker strategy driven by an external tick
///
/// Cheap to clone; clones share the same engine and tasks.
#[derive(Clone)]
pub struct Strategy {
    inner: Arc<Inner>,
}

impl Strategy {
    /// Build the strategy, loading the persisted trade state if there is one
    pub fn new(
        config: &StrategyConfig,
        market: SharedMarket,
        persistence: BoxedStatePersistence,
        events: mpsc::Receiver<OrderEvent>,
        reference_rate: Option<&ReferenceRateConfig>,
    ) -> Result<Self> {
        let source: Arc<dyn RateSource> = Arc::new(MarketRateSource::new(market.clone()));
        Self::with_rate_source(config, market, persistence, events, reference_rate, source)
    }

    /// Same as [`Strategy::new`] with a custom source for the reference rate
    pub fn with_rate_source(
        config: &StrategyConfig,
        market: SharedMarket,
        persistence: BoxedStatePersistence,
        events: mpsc::Receiver<OrderEvent>,
        reference_rate: Option<&ReferenceRateConfig>,
        rate_source: Arc<dyn RateSource>,
    ) -> Result<Self> {
        config.validate()?;
        let pair = config.trading_pair()?;

        let trade_state = match persistence.load()? {
            Some(state) => state,
            None => {
                let state = config.initial_trade_state();
                info!(
                    side = %state.last_side,
                    price = %state.last_price,
                    "Starting from configured trade state"
                );
                state
            }
        };

        let tracker = Arc::new(OrderTracker::new());
        let execution = ExecutionStateMachine::new(
            market.clone(),
            pair.clone(),
            persistence,
            tracker.clone(),
            trade_state,
            ExecutionThresholds::from(config),
            TrendGate::new(config.fast_poll_interval(), config.slow_poll_interval()),
        );
        let engine = CycleEngine {
            builder: ProposalBuilder::new(market.clone(), pair.clone(), config.order_amount),
            adjuster: PriceAdjuster::new(market.clone(), pair.clone()),
            execution,
        };

        let rate_poller =
            reference_rate.map(|rate| RatePoller::new(rate_source, pair.quote.clone(), rate));
        let rate = rate_poller.as_ref().map(RatePoller::rate_handle);

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name.clone(),
                market,
                engine: tokio::sync::Mutex::new(engine),
                tracker,
                shutdown: Shutdown::new(),
                cycle_task: Mutex::new(None),
                background: Mutex::new(Vec::new()),
                events: Mutex::new(Some(events)),
                rate_poller: Mutex::new(rate_poller),
                rate,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Spawn the order event listener and the reference rate poller
    pub fn start(&self) -> Result<()> {
        let mut events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| StrategyError::Internal("strategy already started".to_string()))?;

        let tracker = self.inner.tracker.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let listener = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        event = events.recv() => match event {
                            Some(event) => {
                                debug!(order_id = %event.order_id(), kind = event.kind(), "Order event");
                                tracker.on_event(&event);
                            }
                            None => {
                                warn!("Order event channel closed");
                                break;
                            }
                        },
                    }
                }
            }
            .instrument(info_span!("order_events", strategy = %self.inner.name)),
        );

        let mut background = self
            .inner
            .background
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        background.push(listener);

        let poller = self
            .inner
            .rate_poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(poller) = poller {
            if poller.applies() {
                background.push(poller.spawn(self.inner.shutdown.subscribe()));
            } else {
                info!("Quote asset is the reference asset, rate polling disabled");
            }
        }

        info!(
            strategy = %self.inner.name,
            market = %self.inner.market.name(),
            "Strategy started"
        );
        Ok(())
    }

    /// Scheduling entry point; never blocks
    ///
    /// Returns `true` when a new cycle was started.
    pub fn on_tick(&self, timestamp: DateTime<Utc>) -> bool {
        if self.inner.shutdown.is_triggered() {
            return false;
        }

        if !self.inner.market.ready() {
            warn!(market = %self.inner.market.name(), "Market is not ready. Please wait...");
            return false;
        }

        let mut slot = self
            .inner
            .cycle_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.as_ref() {
            if !task.is_finished() {
                return false;
            }
        }

        let strategy = self.clone();
        let span = info_span!("cycle", strategy = %self.inner.name, tick = %timestamp);
        *slot = Some(tokio::spawn(
            async move { strategy.cycle_then_sleep().await }.instrument(span),
        ));
        true
    }

    async fn cycle_then_sleep(&self) {
        match self.run_cycle().await {
            Ok(outcome) => log_outcome(&outcome),
            Err(e) => error!(error = %e, "Cycle failed"),
        }

        let interval = self.poll_interval().await;
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::select! {
            _ = shutdown.recv() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    /// Run one decision cycle without the trailing sleep
    ///
    /// Concurrent calls are serialized; shutdown interrupts any suspension
    /// point and yields [`CycleOutcome::Cancelled`].
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let mut shutdown = self.inner.shutdown.subscribe();
        if shutdown.is_triggered() {
            return Ok(CycleOutcome::Cancelled);
        }

        tokio::select! {
            biased;
            _ = shutdown.recv() => Ok(CycleOutcome::Cancelled),
            outcome = async {
                let mut engine = self.inner.engine.lock().await;
                engine.run().await
            } => match outcome {
                Err(StrategyError::Stopped) => Ok(CycleOutcome::Cancelled),
                other => other,
            },
        }
    }

    /// Cancel in-flight waits and background tasks
    pub async fn stop(&self) {
        self.inner.shutdown.trigger();

        let cycle = self
            .inner
            .cycle_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(cycle) = cycle {
            let _ = cycle.await;
        }

        let background: Vec<_> = self
            .inner
            .background
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in background {
            let _ = task.await;
        }

        self.inner.engine.lock().await.execution.stop();
        info!(strategy = %self.inner.name, "Strategy stopped");
    }

    pub async fn trade_state(&self) -> TradeState {
        self.inner.engine.lock().await.execution.trade_state()
    }

    pub async fn poll_interval(&self) -> Duration {
        self.inner.engine.lock().await.execution.poll_interval()
    }

    pub async fn has_pending_order(&self) -> bool {
        self.inner.engine.lock().await.execution.has_pending_order()
    }

    /// Latest quote-to-reference rate, if polling is enabled and succeeded
    pub async fn reference_rate(&self) -> Option<Decimal> {
        match &self.inner.rate {
            Some(rate) => *rate.read().await,
            None => None,
        }
    }

    pub fn is_cycle_running(&self) -> bool {
        self.inner
            .cycle_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Submitted { .. } => {}
        CycleOutcome::Deferred { profitability } => {
            info!(profitability = %profitability.round_dp(4), "Profitability still improving, waiting")
        }
        CycleOutcome::Skipped(reason) => info!(?reason, "Cycle skipped"),
        CycleOutcome::Cancelled => debug!("Cycle cancelled"),
    }
}
