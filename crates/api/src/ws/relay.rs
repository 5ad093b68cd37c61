use std::sync::Arc;

use fieldops_events::HubDispatch;
use tokio::sync::broadcast;

use crate::ws::manager::WsManager;

/// Feeds events from the [`EventBus`](fieldops_events::EventBus) into the
/// connection manager.
pub struct EventRelay {
    ws_manager: Arc<WsManager>,
}

impl EventRelay {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the relay loop.
    ///
    /// Exits when the bus is dropped. A lagging receiver skips the events it
    /// missed; clients reconcile by refetching.
    pub async fn run(self, mut receiver: broadcast::Receiver<HubDispatch>) {
        loop {
            match receiver.recv().await {
                Ok(dispatch) => {
                    self.ws_manager.publish(&dispatch.target, &dispatch.event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event relay lagged, some events were not delivered");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, relay shutting down");
                    break;
                }
            }
        }
    }
}
