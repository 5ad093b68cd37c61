//! Typed real-time events and their delivery targets.
//!
//! Every event the hub can push is a variant of [`HubEvent`], serialized as
//! an adjacently tagged `{"type": "...", "data": {...}}` frame with
//! kebab-case type names.

use chrono::{DateTime, Utc};
use fieldops_core::types::DbId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// What happened to a job in a `job-update` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Claimed,
    Started,
    Completed,
}

/// A job's state after a dispatch transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: DbId,
    pub job_number: String,
    pub action: JobAction,
    /// Status code, e.g. `"IN_PROGRESS"`.
    pub status: String,
    pub technician_id: Option<DbId>,
    pub customer_id: Option<DbId>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryUpdate {
    pub item_id: DbId,
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub user_id: DbId,
    pub message: String,
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Human-readable notice shared by the system, user and customer
/// notification events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub level: NoticeLevel,
}

/// Connectivity of the external messaging channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub channel: String,
    pub connected: bool,
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// HubEvent
// ---------------------------------------------------------------------------

/// Closed set of events pushed to real-time connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum HubEvent {
    JobUpdate(JobUpdate),
    InventoryUpdate(InventoryUpdate),
    UserUpdate(UserUpdate),
    SystemNotification(Notice),
    UserNotification(Notice),
    CustomerNotification(Notice),
    #[serde(rename = "whatsapp-status-update")]
    ChannelStatus(ChannelStatus),
}

impl HubEvent {
    /// Wire name of the event, e.g. `"job-update"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobUpdate(_) => "job-update",
            Self::InventoryUpdate(_) => "inventory-update",
            Self::UserUpdate(_) => "user-update",
            Self::SystemNotification(_) => "system-notification",
            Self::UserNotification(_) => "user-notification",
            Self::CustomerNotification(_) => "customer-notification",
            Self::ChannelStatus(_) => "whatsapp-status-update",
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Which connections an event is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every connection in `role:{role}`.
    Role(String),
    /// Every connection in `user:{id}`.
    User(DbId),
    /// Every connection in `customer:{id}`.
    Customer(DbId),
    /// Every registered connection, joined rooms or not.
    All,
}

impl Target {
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role(role.into())
    }

    /// The room name this target resolves to, or `None` for [`Target::All`].
    pub fn room(&self) -> Option<String> {
        match self {
            Self::Role(role) => Some(format!("role:{role}")),
            Self::User(id) => Some(format!("user:{id}")),
            Self::Customer(id) => Some(format!("customer:{id}")),
            Self::All => None,
        }
    }
}

/// An event addressed to a target, as carried on the [`EventBus`](crate::EventBus).
#[derive(Debug, Clone)]
pub struct HubDispatch {
    pub target: Target,
    pub event: HubEvent,
}

impl HubDispatch {
    pub fn new(target: Target, event: HubEvent) -> Self {
        Self { target, event }
    }
}
