use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::common::errors::{Result, StrategyError};
use crate::common::traits::SharedMarket;
use crate::common::types::{OrderCompletion, OrderId, OrderRequest, TradeSide, TradingPair};
use crate::config::StrategyConfig;
use crate::strategy::profitability::profit_pct;
use crate::strategy::tracker::OrderTracker;
use crate::strategy::traits::{BoxedStatePersistence, StatePersistence};
use crate::strategy::trend::TrendGate;
use crate::strategy::types::{CycleOutcome, ExecutionPhase, Proposal, SkipReason, TradeState};

/// Profitability and price limits an order must clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionThresholds {
    pub min_sell_profitability: Decimal,
    pub min_buy_profitability: Decimal,
    pub min_sell_price: Decimal,
    pub buy_amount_margin: Decimal,
}

impl From<&StrategyConfig> for ExecutionThresholds {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            min_sell_profitability: config.min_sell_profitability,
            min_buy_profitability: config.min_buy_profitability,
            min_sell_price: config.min_sell_price,
            buy_amount_margin: config.buy_amount_margin,
        }
    }
}

/// The single order in flight
#[derive(Debug)]
pub struct PendingOrder {
    pub order_id: OrderId,
    pub side: TradeSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub submitted_at: DateTime<Utc>,
    completion: oneshot::Receiver<OrderCompletion>,
    /// Trade state before this submission, restored if the order fails
    previous_state: TradeState,
}

#[derive(Debug)]
pub enum ExecutionState {
    Idle,
    OrderOutstanding(PendingOrder),
    Stopped,
}

/// Sequential controller for order submission
///
/// A new order can only be submitted from `Idle`; the outstanding order's
/// completion has to be consumed through [`await_prior_fill`] first.
///
/// [`await_prior_fill`]: ExecutionStateMachine::await_prior_fill
pub struct ExecutionStateMachine {
    market: SharedMarket,
    pair: TradingPair,
    persistence: Arc<dyn StatePersistence>,
    tracker: Arc<OrderTracker>,
    trade_state: TradeState,
    /// `trade_state` differs from what the store last accepted
    unsaved: bool,
    trend_gate: TrendGate,
    thresholds: ExecutionThresholds,
    state: ExecutionState,
    phase: ExecutionPhase,
    poll_interval: Duration,
}

impl ExecutionStateMachine {
    pub fn new(
        market: SharedMarket,
        pair: TradingPair,
        persistence: BoxedStatePersistence,
        tracker: Arc<OrderTracker>,
        trade_state: TradeState,
        thresholds: ExecutionThresholds,
        trend_gate: TrendGate,
    ) -> Self {
        let poll_interval = trend_gate.fast_interval();
        Self {
            market,
            pair,
            persistence: Arc::from(persistence),
            tracker,
            trade_state,
            unsaved: false,
            trend_gate,
            thresholds,
            state: ExecutionState::Idle,
            phase: ExecutionPhase::Idle,
            poll_interval,
        }
    }

    /// Wait for the outstanding order, if any, to complete
    ///
    /// Returns a skip reason when that order failed. Cancel safe: dropping
    /// the future keeps the order outstanding.
    pub async fn await_prior_fill(&mut self) -> Result<Option<SkipReason>> {
        let received = match &mut self.state {
            ExecutionState::Idle => return Ok(None),
            ExecutionState::Stopped => return Err(StrategyError::Stopped),
            ExecutionState::OrderOutstanding(pending) => {
                self.phase = ExecutionPhase::AwaitingPriorFill;
                debug!(order_id = %pending.order_id, "Waiting for prior order to complete");
                (&mut pending.completion).await
            }
        };

        let pending = match std::mem::replace(&mut self.state, ExecutionState::Idle) {
            ExecutionState::OrderOutstanding(pending) => pending,
            other => {
                self.state = other;
                return Ok(None);
            }
        };
        self.phase = ExecutionPhase::Idle;

        let completion = received.unwrap_or_else(|_| {
            OrderCompletion::failed(pending.order_id.clone(), "completion signal dropped")
        });

        if completion.succeeded {
            info!(
                order_id = %pending.order_id,
                side = %pending.side,
                price = %pending.price,
                detail = %completion.detail,
                "Prior order completed"
            );
            return Ok(None);
        }

        warn!(
            order_id = %pending.order_id,
            side = %pending.side,
            detail = %completion.detail,
            "Prior order failed, skipping cycle"
        );
        self.restore(pending.previous_state).await;
        Ok(Some(SkipReason::PriorOrderFailed {
            order_id: pending.order_id,
            detail: completion.detail,
        }))
    }

    /// Evaluate a proposal and submit it if every gate passes
    #[instrument(skip(self, proposal), fields(side = %proposal.side, price = %proposal.order_price))]
    pub async fn execute(&mut self, proposal: Proposal) -> Result<CycleOutcome> {
        match &self.state {
            ExecutionState::Stopped => return Err(StrategyError::Stopped),
            ExecutionState::OrderOutstanding(pending) => {
                return Err(StrategyError::OrderOutstanding(pending.order_id.clone()))
            }
            ExecutionState::Idle => {}
        }

        if let Some(reason) = self.flush_unsaved().await {
            return Ok(CycleOutcome::Skipped(reason));
        }

        if !proposal.is_executable() {
            debug!(amount = %proposal.amount, "Proposal amount is not positive");
            return Ok(CycleOutcome::Skipped(SkipReason::NonPositiveAmount));
        }

        let last = self.trade_state;
        if proposal.side == last.last_side {
            warn!(last_side = %last.last_side, "Proposal repeats the previous side");
            return Ok(CycleOutcome::Skipped(SkipReason::SideMismatch {
                proposal: proposal.side,
                last: last.last_side,
            }));
        }

        self.phase = ExecutionPhase::Evaluating;
        let profitability = profit_pct(last.last_price, proposal.order_price, last.last_side.is_buy());
        info!(
            last_side = %last.last_side,
            last_price = %last.last_price,
            profitability = %profitability.round_dp(4),
            "Evaluated profitability"
        );

        if last.has_baseline() {
            let decision = self.trend_gate.check(profitability);
            self.poll_interval = decision.next_poll_interval;
            if decision.defer {
                self.phase = ExecutionPhase::Idle;
                return Ok(CycleOutcome::Deferred { profitability });
            }
        } else {
            debug!("No previous trade price, trend gate bypassed");
        }

        let outcome = self.check_limits(&proposal, profitability).await;
        let amount = match outcome {
            Ok(amount) => amount,
            Err(reason) => {
                self.phase = ExecutionPhase::Idle;
                return Ok(CycleOutcome::Skipped(reason));
            }
        };

        Ok(self.submit(proposal.side, proposal.order_price, amount).await)
    }

    /// Threshold, floor and balance checks; returns the amount to submit
    async fn check_limits(
        &self,
        proposal: &Proposal,
        profitability: Decimal,
    ) -> std::result::Result<Decimal, SkipReason> {
        let (threshold, amount) = match proposal.side {
            TradeSide::Sell => (self.thresholds.min_sell_profitability, proposal.amount),
            TradeSide::Buy => (
                self.thresholds.min_buy_profitability,
                self.market.quantize_order_amount(
                    &self.pair,
                    proposal.amount * self.thresholds.buy_amount_margin,
                ),
            ),
        };

        if profitability <= threshold {
            debug!(%profitability, %threshold, "Profitability below threshold");
            return Err(SkipReason::BelowThreshold {
                profitability,
                threshold,
            });
        }

        if proposal.side == TradeSide::Sell && proposal.order_price <= self.thresholds.min_sell_price {
            debug!(
                price = %proposal.order_price,
                floor = %self.thresholds.min_sell_price,
                "Sell price below floor"
            );
            return Err(SkipReason::BelowPriceFloor {
                price: proposal.order_price,
                floor: self.thresholds.min_sell_price,
            });
        }

        let asset = self.pair.spent_asset(proposal.side);
        let required = match proposal.side {
            TradeSide::Buy => amount * proposal.order_price,
            TradeSide::Sell => amount,
        };
        let available = match self.market.get_available_balance(asset).await {
            Ok(available) => available,
            Err(e) => {
                warn!(asset, error = %e, "Balance lookup failed");
                return Err(SkipReason::MarketError(e.to_string()));
            }
        };
        if available < required {
            warn!(asset, %available, %required, "Insufficient balance");
            return Err(SkipReason::InsufficientBalance {
                asset: asset.to_string(),
                available,
                required,
            });
        }

        Ok(amount)
    }

    async fn submit(&mut self, side: TradeSide, price: Decimal, amount: Decimal) -> CycleOutcome {
        self.phase = ExecutionPhase::Submitting;
        let request = OrderRequest {
            pair: self.pair.clone(),
            side,
            amount,
            price,
            order_type: self.market.taker_order_type(),
        };
        let previous_state = self.trade_state;

        let outcome = match self.market.place_order(&request).await {
            Ok(order_id) => {
                let completion = self.tracker.watch(order_id.clone());
                self.trade_state = TradeState::new(side, price);
                self.trend_gate.reset();
                self.state = ExecutionState::OrderOutstanding(PendingOrder {
                    order_id: order_id.clone(),
                    side,
                    price,
                    amount,
                    submitted_at: Utc::now(),
                    completion,
                    previous_state,
                });

                info!(
                    %order_id,
                    %side,
                    %price,
                    %amount,
                    market = %self.market.name(),
                    "Order submitted"
                );
                // A failed save is retried by the next `execute`
                let _ = self.persist().await;
                CycleOutcome::Submitted {
                    order_id,
                    side,
                    price,
                    amount,
                }
            }
            Err(e) => {
                error!(%side, %price, %amount, error = %e, "Order submission failed");
                // Surfaces on the next cycle as a failed completion
                let order_id = OrderId::new(format!("rejected-{}", Utc::now().timestamp_millis()));
                let (tx, completion) = oneshot::channel();
                let _ = tx.send(OrderCompletion::failed(order_id.clone(), e.to_string()));
                self.state = ExecutionState::OrderOutstanding(PendingOrder {
                    order_id,
                    side,
                    price,
                    amount,
                    submitted_at: Utc::now(),
                    completion,
                    previous_state,
                });
                CycleOutcome::Skipped(SkipReason::SubmissionFailed(e.to_string()))
            }
        };

        self.phase = ExecutionPhase::Idle;
        outcome
    }

    async fn restore(&mut self, previous: TradeState) {
        if self.trade_state == previous {
            return;
        }
        info!(
            side = %previous.last_side,
            price = %previous.last_price,
            "Restoring trade state from before the failed order"
        );
        self.trade_state = previous;
        let _ = self.persist().await;
    }

    /// Retry a trade state save that failed earlier
    ///
    /// Returns a skip reason while the store still rejects the write; no new
    /// order may go out until the store holds the last traded side.
    async fn flush_unsaved(&mut self) -> Option<SkipReason> {
        if !self.unsaved {
            return None;
        }
        match self.persist().await {
            Ok(()) => {
                info!(
                    side = %self.trade_state.last_side,
                    price = %self.trade_state.last_price,
                    "Trade state saved after retry"
                );
                None
            }
            Err(e) => Some(SkipReason::StateNotPersisted(e.to_string())),
        }
    }

    /// Save the current trade state on the blocking pool
    ///
    /// The file write and fsync must not stall the runtime worker. The state
    /// stays marked unsaved until the store accepts it, including when this
    /// future is dropped mid-write.
    async fn persist(&mut self) -> Result<()> {
        self.unsaved = true;
        let store = Arc::clone(&self.persistence);
        let state = self.trade_state;
        let result = match tokio::task::spawn_blocking(move || store.save(&state)).await {
            Ok(saved) => saved,
            Err(e) => Err(StrategyError::Internal(format!("state save task failed: {}", e))),
        };

        match &result {
            Ok(()) => self.unsaved = false,
            Err(e) => error!(error = %e, "Failed to persist trade state"),
        }
        result
    }

    /// Enter the terminal state, abandoning any outstanding order
    pub fn stop(&mut self) {
        if let ExecutionState::OrderOutstanding(pending) = &self.state {
            info!(order_id = %pending.order_id, "Stopping with an order outstanding");
        }
        self.tracker.clear();
        self.state = ExecutionState::Stopped;
        self.phase = ExecutionPhase::Stopped;
    }

    pub fn trade_state(&self) -> TradeState {
        self.trade_state
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn has_pending_order(&self) -> bool {
        matches!(self.state, ExecutionState::OrderOutstanding(_))
    }

    pub fn pending_order(&self) -> Option<&PendingOrder> {
        match &self.state {
            ExecutionState::OrderOutstanding(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn trend_gate(&self) -> &TrendGate {
        &self.trend_gate
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, ExecutionState::Stopped)
    }

    /// Whether the last trade state change is still waiting to be saved
    pub fn has_unsaved_state(&self) -> bool {
        self.unsaved
    }
}
