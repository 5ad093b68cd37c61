//! Typed outcomes for technician dispatch requests.
//!
//! A rejected claim/start/complete is an expected business outcome, not an
//! error, so it travels as a [`DispatchRejection`] value. The wire form is
//! the SCREAMING_SNAKE_CASE reason string the messaging front end matches on.

use serde::{Deserialize, Serialize};

/// Why a dispatch request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchRejection {
    /// Another technician holds a live assignment on the job.
    AlreadyClaimed,
    /// No job with the given id or number exists.
    JobNotFound,
    /// The job's status does not permit a claim (e.g. completed or cancelled).
    JobNotClaimable,
    /// The technician is unknown, inactive, or admin-flagged.
    TechnicianNotRegistered,
    /// The caller is not the technician currently assigned to the job.
    NotAssignedToTechnician,
    /// The job is not in the status the requested transition starts from.
    InvalidStatusTransition,
}

impl DispatchRejection {
    /// The wire reason code, e.g. `"ALREADY_CLAIMED"`.
    pub fn code(self) -> &'static str {
        match self {
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::JobNotClaimable => "JOB_NOT_CLAIMABLE",
            Self::TechnicianNotRegistered => "TECHNICIAN_NOT_REGISTERED",
            Self::NotAssignedToTechnician => "NOT_ASSIGNED_TO_TECHNICIAN",
            Self::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
        }
    }

    /// Whether the caller should re-poll open jobs instead of retrying.
    pub fn is_contention(self) -> bool {
        matches!(self, Self::AlreadyClaimed)
    }
}

impl std::fmt::Display for DispatchRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
