//! FieldOps event plumbing and outbound notification delivery.
//!
//! - [`HubEvent`] / [`Target`] -- the closed set of real-time events and who
//!   receives them.
//! - [`EventBus`] -- in-process fan-out backed by `tokio::sync::broadcast`.
//! - [`gateway`] -- the external messaging channel seam.
//! - [`NotificationQueue`] -- durable, retrying delivery of notification
//!   intents through the gateway.

pub mod bus;
pub mod event;
pub mod gateway;
pub mod queue;

pub use bus::EventBus;
pub use event::{HubDispatch, HubEvent, Target};
pub use gateway::{ChannelGateway, DisconnectedGateway, GatewayError, HttpBridgeGateway};
pub use queue::{DrainReport, NotificationQueue, QueueConfig};
