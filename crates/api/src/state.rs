use std::sync::Arc;

use fieldops_core::clock::Clock;
use fieldops_core::rate_limit::{ConnectionRateLimiter, DEFAULT_WINDOW_SECS};
use fieldops_db::{DispatchStore, NotificationStore};
use fieldops_events::{ChannelGateway, EventBus, NotificationQueue};

use crate::config::ServerConfig;
use crate::dispatch::Coordinator;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Built once per process; holds every piece of formerly-global state (the
/// clock, the rate-limit and heartbeat maps, the channel gateway) so tests can
/// assemble one with fakes. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// Jobs, technicians and dispatch transitions.
    pub store: Arc<dyn DispatchStore>,
    pub config: Arc<ServerConfig>,
    pub clock: Arc<dyn Clock>,
    /// WebSocket connection manager (dashboard clients).
    pub ws_manager: Arc<WsManager>,
    /// In-process bus feeding the WebSocket relay.
    pub event_bus: Arc<EventBus>,
    pub queue: Arc<NotificationQueue>,
    pub coordinator: Arc<Coordinator>,
    /// Admission control for WebSocket upgrades.
    pub rate_limiter: Arc<ConnectionRateLimiter>,
}

impl AppState {
    /// Wire the services together. Background loops are started separately.
    pub fn new(
        config: ServerConfig,
        dispatch_store: Arc<dyn DispatchStore>,
        notification_store: Arc<dyn NotificationStore>,
        gateway: Arc<dyn ChannelGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let queue = Arc::new(NotificationQueue::new(
            notification_store,
            gateway,
            Arc::clone(&event_bus),
            config.queue.clone(),
        ));
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&dispatch_store),
            Arc::clone(&queue),
            Arc::clone(&event_bus),
        ));
        let window = chrono::Duration::from_std(config.hub.rate_limit_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_WINDOW_SECS));
        let rate_limiter = Arc::new(ConnectionRateLimiter::new(
            config.hub.rate_limit_max,
            window,
            Arc::clone(&clock),
        ));
        let ws_manager = Arc::new(WsManager::new(Arc::clone(&clock)));

        Self {
            store: dispatch_store,
            config: Arc::new(config),
            clock,
            ws_manager,
            event_bus,
            queue,
            coordinator,
            rate_limiter,
        }
    }
}
