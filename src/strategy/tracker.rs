use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::common::types::{OrderCompletion, OrderEvent, OrderId};

/// Completions kept for orders that are not watched yet
const MAX_EARLY_COMPLETIONS: usize = 64;

#[derive(Default)]
struct TrackerState {
    watching: Option<(OrderId, oneshot::Sender<OrderCompletion>)>,
    early: VecDeque<OrderCompletion>,
}

/// Routes pushed order events to the completion signal of the pending order
///
/// A fast venue can report a fill before `place_order` has returned the id to
/// the caller, so completions for unknown ids are buffered and handed out when
/// the id is watched.
#[derive(Default)]
pub struct OrderTracker {
    state: Mutex<TrackerState>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `order_id` as the pending order and get its completion signal
    ///
    /// Replaces any previous watch; its receiver sees a closed channel.
    pub fn watch(&self, order_id: OrderId) -> oneshot::Receiver<OrderCompletion> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(pos) = state.early.iter().position(|c| c.order_id == order_id) {
            if let Some(completion) = state.early.remove(pos) {
                debug!(%order_id, "Order completed before it was watched");
                let _ = tx.send(completion);
                return rx;
            }
        }

        if let Some((previous, _)) = state.watching.replace((order_id, tx)) {
            warn!(%previous, "Dropping watch on an order that never completed");
        }
        rx
    }

    /// Feed an order event from the market
    ///
    /// Returns `true` when the event resolved the watched order.
    pub fn on_event(&self, event: &OrderEvent) -> bool {
        let completion = OrderCompletion::from_event(event);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let matches = matches!(&state.watching, Some((id, _)) if *id == completion.order_id);
        if matches {
            if let Some((order_id, tx)) = state.watching.take() {
                debug!(%order_id, kind = event.kind(), "Order completion observed");
                if tx.send(completion).is_err() {
                    debug!(%order_id, "Completion receiver already dropped");
                }
                return true;
            }
        }

        if state.early.len() >= MAX_EARLY_COMPLETIONS {
            state.early.pop_front();
        }
        state.early.push_back(completion);
        false
    }

    /// Id of the order currently watched
    pub fn watched(&self) -> Option<OrderId> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.watching.as_ref().map(|(id, _)| id.clone())
    }

    /// Drop the current watch without resolving it
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.watching = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::common::types::TradeSide;

    fn filled(id: &str) -> OrderEvent {
        OrderEvent::Filled {
            order_id: OrderId::new(id),
            side: TradeSide::Buy,
            amount: dec!(1),
            price: dec!(100),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_resolves_watched_order() {
        let tracker = OrderTracker::new();
        let rx = tracker.watch(OrderId::new("a"));
        assert_eq!(tracker.watched(), Some(OrderId::new("a")));

        assert!(tracker.on_event(&filled("a")));
        let completion = rx.await.unwrap();
        assert!(completion.succeeded);
        assert_eq!(completion.order_id, OrderId::new("a"));
        assert_eq!(tracker.watched(), None);
    }

    #[tokio::test]
    async fn test_early_completion_is_buffered() {
        let tracker = OrderTracker::new();
        assert!(!tracker.on_event(&OrderEvent::Failed {
            order_id: OrderId::new("b"),
            reason: "rejected".to_string(),
        }));

        let completion = tracker.watch(OrderId::new("b")).await.unwrap();
        assert!(!completion.succeeded);
        assert_eq!(completion.detail, "rejected");
        assert_eq!(tracker.watched(), None);
    }

    #[tokio::test]
    async fn test_unrelated_event_does_not_resolve() {
        let tracker = OrderTracker::new();
        let mut rx = tracker.watch(OrderId::new("c"));

        assert!(!tracker.on_event(&filled("other")));
        assert!(rx.try_recv().is_err());

        assert!(tracker.on_event(&OrderEvent::Expired {
            order_id: OrderId::new("c")
        }));
        assert!(rx.await.unwrap().succeeded);
    }

    #[test]
    fn test_early_buffer_is_bounded() {
        let tracker = OrderTracker::new();
        for i in 0..(MAX_EARLY_COMPLETIONS + 10) {
            tracker.on_event(&filled(&i.to_string()));
        }
        let state = tracker.state.lock().unwrap();
        assert_eq!(state.early.len(), MAX_EARLY_COMPLETIONS);
        assert_eq!(state.early.front().unwrap().order_id, OrderId::new("10"));
    }
}
