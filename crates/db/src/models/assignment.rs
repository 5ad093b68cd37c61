//! Job-to-technician assignment rows.

use fieldops_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Default assignment role for the claiming technician.
pub const ROLE_PRIMARY: &str = "primary";

/// A row from the `job_assignments` table.
///
/// Created once per successful claim. Only the timestamp stamps change
/// afterwards; an assignment is live while `completed_at` is `None`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Assignment {
    pub id: DbId,
    pub job_id: DbId,
    pub technician_id: DbId,
    pub role: String,
    pub assigned_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Assignment {
    pub fn is_live(&self) -> bool {
        self.completed_at.is_none()
    }
}
