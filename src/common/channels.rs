//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use super::types::OrderEvent;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new order event channel with the default buffer size
pub fn create_order_event_channel() -> (mpsc::Sender<OrderEvent>, mpsc::Receiver<OrderEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}
