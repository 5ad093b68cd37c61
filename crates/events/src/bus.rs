//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Producers (the dispatch coordinator, the delivery queue) publish
//! [`HubDispatch`]es without knowing about sockets; the real-time hub's
//! relay task is the subscriber. Shared via `Arc<EventBus>`.

use tokio::sync::broadcast;

use crate::event::{HubDispatch, HubEvent, Target};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for hub events.
pub struct EventBus {
    sender: broadcast::Sender<HubDispatch>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event for `target`.
    ///
    /// Delivery is fire-and-forget: with no subscribers the event is dropped.
    pub fn publish(&self, target: Target, event: HubEvent) {
        tracing::trace!(kind = event.kind(), ?target, "Publishing hub event");
        // SendError only means there are zero receivers.
        let _ = self.sender.send(HubDispatch::new(target, event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubDispatch> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
