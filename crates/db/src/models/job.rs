//! Field job models and the outcomes of dispatch writes.

use fieldops_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::assignment::Assignment;
use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub job_number: String,
    pub title: String,
    pub status_id: StatusId,
    pub priority: i32,
    pub customer_id: Option<DbId>,
    pub customer_handle: Option<String>,
    pub completion_notes: Option<String>,
    pub assigned_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// The typed status, if the stored id is known.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}

/// DTO for job intake. Jobs always start `OPEN`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub job_number: String,
    pub title: String,
    pub priority: Option<i32>,
    pub customer_id: Option<DbId>,
    pub customer_handle: Option<String>,
}

/// Result of the conditional claim transaction.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The assignment was inserted and the job moved to `ASSIGNED`.
    Claimed { job: Job, assignment: Assignment },
    /// A live assignment already exists for the job.
    AlreadyClaimed,
    /// The job's status does not permit a claim.
    NotClaimable { current: StatusId },
    /// No job with that id.
    JobNotFound,
}

/// Result of a start/complete transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was applied.
    Applied { job: Job, assignment: Assignment },
    /// The technician is not the job's current assignee.
    NotAssignee,
    /// The job is not in the required predecessor status.
    InvalidTransition { current: StatusId },
    /// No job with that id.
    JobNotFound,
}
