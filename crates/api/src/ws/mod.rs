//! Real-Time Broadcast Hub.
//!
//! Authenticated, room-scoped WebSocket fan-out: connection registry and
//! rooms ([`WsManager`]), the upgrade handler, the heartbeat sweep, and the
//! relay that feeds [`EventBus`](fieldops_events::EventBus) dispatches into
//! the manager.

mod handler;
mod heartbeat;
pub mod manager;
pub mod protocol;
mod relay;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{ConnIdentity, JoinError, WsManager};
pub use relay::EventRelay;
