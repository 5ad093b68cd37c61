//! Outbound notification intent models.

use fieldops_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{NotificationStatus, StatusId};

/// A row from the `notification_intents` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationIntent {
    pub id: DbId,
    pub recipient: String,
    pub payload: String,
    pub channel: String,
    pub status_id: StatusId,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub sent_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl NotificationIntent {
    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::from_id(self.status_id)
    }
}

/// DTO for enqueueing a notification. Intents always start `PENDING`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationIntent {
    pub recipient: String,
    pub payload: String,
    pub channel: String,
    pub job_id: Option<DbId>,
}

/// Intent counts grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

impl NotificationStats {
    pub fn total(&self) -> i64 {
        self.pending + self.sent + self.failed
    }

    /// Add `count` rows of `status_id` to the matching bucket.
    pub fn add(&mut self, status_id: StatusId, count: i64) {
        match NotificationStatus::from_id(status_id) {
            Some(NotificationStatus::Pending) => self.pending += count,
            Some(NotificationStatus::Sent) => self.sent += count,
            Some(NotificationStatus::Failed) => self.failed += count,
            None => {}
        }
    }
}
