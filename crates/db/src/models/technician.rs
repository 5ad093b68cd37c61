//! Field technician models.

use fieldops_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `technicians` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Technician {
    pub id: DbId,
    /// Handle on the external messaging channel (e.g. a phone number).
    pub handle: String,
    pub name: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Technician {
    /// Active, non-admin technicians may claim and work jobs.
    pub fn is_dispatch_eligible(&self) -> bool {
        self.is_active && !self.is_admin
    }
}

/// DTO for registering a technician.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTechnician {
    pub handle: String,
    pub name: String,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}
