//! End-to-end tests for the strategy against the paper market
//!
//! Every test drives real cycles through `Strategy::run_cycle` or
//! `Strategy::on_tick`; fills arrive asynchronously from the paper market.

mod common;

use chrono::Utc;
use common::{
    market_config, pair, permissive_config, start_in_memory, start_strategy, strategy_config,
    wait_until,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use swing_trader::config::ReferenceRateConfig;
use swing_trader::{
    CycleOutcome, InMemoryStatePersistence, OrderId, SkipReason, StatePersistence, TradeSide,
    TradeState, TradingPair,
};
use tokio_test::assert_ok;

// ============================================================================
// Decision scenarios
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_first_cycle_sells_without_baseline() {
    let (harness, store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert_eq!(
        outcome,
        CycleOutcome::Submitted {
            order_id: OrderId::new("paper-1"),
            side: TradeSide::Sell,
            price: dec!(100),
            amount: dec!(1),
        }
    );
    assert_eq!(
        store.current(),
        Some(TradeState::new(TradeSide::Sell, dec!(100)))
    );

    let market = harness.market.clone();
    assert!(wait_until(Duration::from_secs(2), || market.filled_orders() == 1).await);
    assert_eq!(harness.market.balance("ETH"), dec!(9));
    assert_eq!(harness.market.balance("USDC"), dec!(1100));

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_losing_sell_is_not_submitted() {
    let previous = TradeState::new(TradeSide::Buy, dec!(100));
    let (harness, store) = start_in_memory(&strategy_config(), market_config(dec!(99)), Some(previous));

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert_eq!(
        outcome,
        CycleOutcome::Skipped(SkipReason::BelowThreshold {
            profitability: dec!(-1),
            threshold: dec!(0.2),
        })
    );
    assert!(harness.market.placed_orders().is_empty());
    assert_eq!(store.current(), Some(previous));
    assert_eq!(store.save_count(), 0);

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_buy_after_sell_waits_for_crest_then_inflates_amount() {
    let previous = TradeState::new(TradeSide::Sell, dec!(100));
    let (harness, store) = start_in_memory(&strategy_config(), market_config(dec!(94)), Some(previous));

    // Profitability is still improving at 94: keep watching on the fast interval
    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(matches!(outcome, CycleOutcome::Deferred { .. }));
    assert_eq!(harness.strategy.poll_interval().await, Duration::from_secs(5));

    // Price bounced to 95: profitability fell from ~6.38 to ~5.26
    harness.market.set_mid_price(dec!(95));
    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert_eq!(
        outcome,
        CycleOutcome::Submitted {
            order_id: OrderId::new("paper-1"),
            side: TradeSide::Buy,
            price: dec!(95),
            amount: dec!(1.002),
        }
    );
    assert_eq!(harness.strategy.poll_interval().await, Duration::from_secs(30));
    assert_eq!(store.current(), Some(TradeState::new(TradeSide::Buy, dec!(95))));

    let placed = harness.market.placed_orders();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].amount, dec!(1.002));

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_failed_order_skips_next_cycle_and_keeps_prior_state() {
    let (harness, store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);
    harness.market.fail_next_fill();

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(outcome.is_submitted());

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::PriorOrderFailed { .. })
    ));
    assert_eq!(harness.market.placed_orders().len(), 1);
    assert_eq!(
        store.current(),
        Some(TradeState::new(TradeSide::Buy, Decimal::ZERO))
    );
    assert_eq!(
        harness.strategy.trade_state().await,
        TradeState::new(TradeSide::Buy, Decimal::ZERO)
    );

    // A fresh proposal is built on the following cycle
    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(outcome.is_submitted());
    assert_eq!(harness.market.placed_orders().len(), 2);

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_rejected_submission_is_not_retried() {
    let (harness, store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);
    harness.market.fail_next_submission();

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::SubmissionFailed(_))
    ));

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::PriorOrderFailed { .. })
    ));
    assert!(harness.market.placed_orders().is_empty());
    assert_eq!(store.save_count(), 0);

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_missing_quotes_discard_proposal() {
    let (harness, _store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);
    harness.market.set_quotes_available(false);

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::IncompleteProposal));
    assert!(harness.market.placed_orders().is_empty());

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_insufficient_balance_skips_cycle() {
    let (harness, _store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);
    harness.market.set_balance("ETH", dec!(0.5));

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert_eq!(
        outcome,
        CycleOutcome::Skipped(SkipReason::InsufficientBalance {
            asset: "ETH".to_string(),
            available: dec!(0.5),
            required: dec!(1),
        })
    );

    harness.strategy.stop().await;
}

// ============================================================================
// Sequencing invariants
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_sides_strictly_alternate() {
    let market = swing_trader::config::SimulatedMarketConfig {
        spread_pct: dec!(0.05),
        ..market_config(dec!(100))
    };
    let (harness, _store) = start_in_memory(&permissive_config(), market, None);

    for _ in 0..6 {
        let outcome = assert_ok!(harness.strategy.run_cycle().await);
        assert!(outcome.is_submitted(), "unexpected outcome {:?}", outcome);
    }

    let sides: Vec<TradeSide> = harness
        .market
        .placed_orders()
        .iter()
        .map(|order| order.side)
        .collect();
    assert_eq!(
        sides,
        vec![
            TradeSide::Sell,
            TradeSide::Buy,
            TradeSide::Sell,
            TradeSide::Buy,
            TradeSide::Sell,
            TradeSide::Buy,
        ]
    );
    assert_eq!(harness.market.max_outstanding_orders(), 1);

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_unsaved_trade_blocks_next_order() {
    let (harness, store) = start_in_memory(&permissive_config(), market_config(dec!(100)), None);
    store.set_fail_saves(true);

    let outcome = assert_ok!(harness.strategy.run_cycle().await);
    assert!(outcome.is_submitted());
    assert_eq!(store.current(), None);

    // The sell filled but never reached the store: trading waits for it
    for _ in 0..2 {
        let outcome = assert_ok!(harness.strategy.run_cycle().await);
        assert!(
            matches!(outcome, CycleOutcome::Skipped(SkipReason::StateNotPersisted(_))),
            "{:?}",
            outcome
        );
    }
    assert_eq!(harness.market.placed_orders().len(), 1);

    store.set_fail_saves(false);
    assert_ok!(harness.strategy.run_cycle().await);
    assert_eq!(
        store.current(),
        Some(TradeState::new(TradeSide::Sell, dec!(100)))
    );

    harness.strategy.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cycles_never_overlap_orders() {
    let market = swing_trader::config::SimulatedMarketConfig {
        spread_pct: dec!(0.05),
        fill_delay_ms: 15,
        ..market_config(dec!(100))
    };
    let (harness, _store) = start_in_memory(&permissive_config(), market, None);

    for _ in 0..3 {
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let strategy = harness.strategy.clone();
                tokio::spawn(async move { strategy.run_cycle().await })
            })
            .collect();
        for task in tasks {
            assert_ok!(task.await.expect("cycle task panicked"));
        }
    }

    assert!(harness.market.placed_orders().len() >= 2);
    assert_eq!(harness.market.max_outstanding_orders(), 1);

    let sides: Vec<TradeSide> = harness
        .market
        .placed_orders()
        .iter()
        .map(|order| order.side)
        .collect();
    for pair in sides.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }

    harness.strategy.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_on_tick_starts_at_most_one_cycle() {
    let (harness, _store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);

    assert!(harness.strategy.on_tick(Utc::now()));
    // The cycle task sleeps its poll interval after running
    assert!(!harness.strategy.on_tick(Utc::now()));
    assert!(harness.strategy.is_cycle_running());

    let market = harness.market.clone();
    assert!(wait_until(Duration::from_secs(2), || market.placed_orders().len() == 1).await);
    assert!(!harness.strategy.on_tick(Utc::now()));

    harness.strategy.stop().await;
    assert!(!harness.strategy.is_cycle_running());
    assert!(!harness.strategy.on_tick(Utc::now()));
    assert_eq!(harness.market.placed_orders().len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_ticks_wait_for_market_readiness() {
    let (harness, _store) = start_in_memory(&strategy_config(), market_config(dec!(100)), None);
    harness.market.set_ready(false);

    assert!(!harness.strategy.on_tick(Utc::now()));
    assert!(!harness.strategy.is_cycle_running());

    harness.market.set_ready(true);
    assert!(harness.strategy.on_tick(Utc::now()));

    harness.strategy.stop().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_stop_cancels_wait_without_persisting() {
    let market = swing_trader::config::SimulatedMarketConfig {
        fill_delay_ms: 60_000,
        ..market_config(dec!(100))
    };
    let (harness, store) = start_in_memory(&strategy_config(), market, None);

    assert!(assert_ok!(harness.strategy.run_cycle().await).is_submitted());
    assert_eq!(store.save_count(), 1);

    let waiting = {
        let strategy = harness.strategy.clone();
        tokio::spawn(async move { strategy.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    tokio::time::timeout(Duration::from_secs(1), harness.strategy.stop())
        .await
        .expect("stop should be prompt");
    let outcome = waiting.await.expect("cycle task panicked");
    assert_eq!(assert_ok!(outcome), CycleOutcome::Cancelled);

    assert_eq!(store.save_count(), 1);
    assert_eq!(
        store.current(),
        Some(TradeState::new(TradeSide::Sell, dec!(100)))
    );
    assert_eq!(
        assert_ok!(harness.strategy.run_cycle().await),
        CycleOutcome::Cancelled
    );
}

// ============================================================================
// Reference rate
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_reference_rate_is_polled() {
    let rate_config = ReferenceRateConfig {
        asset: "WETH".to_string(),
        interval_secs: 300,
        error_backoff_ms: 20,
    };
    let harness = start_strategy(
        &strategy_config(),
        market_config(dec!(100)),
        Box::new(InMemoryStatePersistence::new()),
        Some(&rate_config),
    );

    // No quote for USDC-WETH yet: the poller backs off and retries
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.strategy.reference_rate().await, None);

    harness
        .market
        .set_rate(TradingPair::new("USDC", "WETH"), dec!(0.0004));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while harness.strategy.reference_rate().await.is_none() {
        assert!(tokio::time::Instant::now() < deadline, "rate never fetched");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.strategy.reference_rate().await, Some(dec!(0.0004)));

    tokio::time::timeout(Duration::from_secs(1), harness.strategy.stop())
        .await
        .expect("poller should stop promptly");
}

#[test_log::test(tokio::test)]
async fn test_invalid_config_is_rejected() {
    let config = swing_trader::config::StrategyConfig {
        trading_pair: "ETHUSDC".to_string(),
        ..strategy_config()
    };
    let (tx, rx) = swing_trader::common::channels::create_order_event_channel();
    let market = std::sync::Arc::new(
        swing_trader::SimulatedMarket::new(market_config(dec!(100)), pair(), tx).unwrap(),
    );

    let store = InMemoryStatePersistence::new();
    assert!(store.load().unwrap().is_none());
    let result = swing_trader::Strategy::new(&config, market, Box::new(store), rx, None);
    assert!(result.is_err());
}
