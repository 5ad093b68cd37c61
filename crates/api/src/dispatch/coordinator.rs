use std::sync::Arc;

use fieldops_core::dispatch::DispatchRejection;
use fieldops_core::roles::{ROLE_ADMIN, ROLE_STAFF};
use fieldops_core::types::DbId;
use fieldops_db::models::job::{ClaimOutcome, Job, TransitionOutcome};
use fieldops_db::models::status::JobStatus;
use fieldops_db::models::technician::Technician;
use fieldops_db::DispatchStore;
use fieldops_events::event::{JobAction, JobUpdate};
use fieldops_events::{EventBus, HubEvent, NotificationQueue, Target};
use serde::Serialize;

/// Upper bound on the open-jobs listing.
pub const OPEN_JOBS_LIMIT: i64 = 100;

/// Result of a claim/start/complete request, as returned to the caller.
///
/// Serializes to `{"ok": true, "job": {...}}` or
/// `{"ok": false, "reason": "ALREADY_CLAIMED"}`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DispatchRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

impl DispatchOutcome {
    pub fn accepted(job: Job) -> Self {
        Self {
            ok: true,
            reason: None,
            job: Some(job),
        }
    }

    pub fn rejected(reason: DispatchRejection) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            job: None,
        }
    }
}

/// Arbitrates technician requests against jobs.
///
/// Rejections carry no side effects. Store errors propagate; a failure to
/// enqueue the customer notification after a committed transition is logged
/// and does not undo the transition.
pub struct Coordinator {
    store: Arc<dyn DispatchStore>,
    queue: Arc<NotificationQueue>,
    bus: Arc<EventBus>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        queue: Arc<NotificationQueue>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { store, queue, bus }
    }

    // -----------------------------------------------------------------------
    // By id
    // -----------------------------------------------------------------------

    /// Claim `job_id` for `technician_id`. At most one concurrent claim wins.
    pub async fn claim(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        match self.eligible_technician(technician_id).await? {
            Some(technician) => self.claim_as(&technician, job_id).await,
            None => Ok(self.reject(DispatchRejection::TechnicianNotRegistered, job_id, technician_id)),
        }
    }

    /// Move an `ASSIGNED` job to `IN_PROGRESS`.
    pub async fn start(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        match self.eligible_technician(technician_id).await? {
            Some(technician) => self.start_as(&technician, job_id).await,
            None => Ok(self.reject(DispatchRejection::TechnicianNotRegistered, job_id, technician_id)),
        }
    }

    /// Move an `IN_PROGRESS` job to `COMPLETED` with optional notes.
    pub async fn complete(
        &self,
        job_id: DbId,
        technician_id: DbId,
        notes: Option<&str>,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        match self.eligible_technician(technician_id).await? {
            Some(technician) => self.complete_as(&technician, job_id, notes).await,
            None => Ok(self.reject(DispatchRejection::TechnicianNotRegistered, job_id, technician_id)),
        }
    }

    // -----------------------------------------------------------------------
    // By job number and channel handle
    // -----------------------------------------------------------------------

    pub async fn claim_by_number(
        &self,
        job_number: &str,
        handle: &str,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let (technician, job) = match self.resolve(job_number, handle).await? {
            Ok(resolved) => resolved,
            Err(outcome) => return Ok(outcome),
        };
        self.claim_as(&technician, job.id).await
    }

    pub async fn start_by_number(
        &self,
        job_number: &str,
        handle: &str,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let (technician, job) = match self.resolve(job_number, handle).await? {
            Ok(resolved) => resolved,
            Err(outcome) => return Ok(outcome),
        };
        self.start_as(&technician, job.id).await
    }

    pub async fn complete_by_number(
        &self,
        job_number: &str,
        handle: &str,
        notes: Option<&str>,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let (technician, job) = match self.resolve(job_number, handle).await? {
            Ok(resolved) => resolved,
            Err(outcome) => return Ok(outcome),
        };
        self.complete_as(&technician, job.id, notes).await
    }

    /// `OPEN` jobs, highest priority first, then oldest.
    pub async fn open_jobs(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        self.store
            .list_open_jobs(limit.clamp(1, OPEN_JOBS_LIMIT))
            .await
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    async fn claim_as(
        &self,
        technician: &Technician,
        job_id: DbId,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let reason = match self.store.claim_job(job_id, technician.id).await? {
            ClaimOutcome::Claimed { job, .. } => {
                tracing::info!(
                    job_id,
                    job_number = %job.job_number,
                    technician_id = technician.id,
                    "Job claimed"
                );
                self.announce(&job, technician, JobAction::Claimed).await;
                return Ok(DispatchOutcome::accepted(job));
            }
            ClaimOutcome::AlreadyClaimed => DispatchRejection::AlreadyClaimed,
            ClaimOutcome::NotClaimable { .. } => DispatchRejection::JobNotClaimable,
            ClaimOutcome::JobNotFound => DispatchRejection::JobNotFound,
        };
        Ok(self.reject(reason, job_id, technician.id))
    }

    async fn start_as(
        &self,
        technician: &Technician,
        job_id: DbId,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let outcome = self.store.start_job(job_id, technician.id).await?;
        self.finish_transition(outcome, technician, job_id, JobAction::Started)
            .await
    }

    async fn complete_as(
        &self,
        technician: &Technician,
        job_id: DbId,
        notes: Option<&str>,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let outcome = self.store.complete_job(job_id, technician.id, notes).await?;
        self.finish_transition(outcome, technician, job_id, JobAction::Completed)
            .await
    }

    async fn finish_transition(
        &self,
        outcome: TransitionOutcome,
        technician: &Technician,
        job_id: DbId,
        action: JobAction,
    ) -> Result<DispatchOutcome, sqlx::Error> {
        let reason = match outcome {
            TransitionOutcome::Applied { job, .. } => {
                tracing::info!(
                    job_id,
                    job_number = %job.job_number,
                    technician_id = technician.id,
                    ?action,
                    "Job transitioned"
                );
                self.announce(&job, technician, action).await;
                return Ok(DispatchOutcome::accepted(job));
            }
            TransitionOutcome::NotAssignee => DispatchRejection::NotAssignedToTechnician,
            TransitionOutcome::InvalidTransition { .. } => DispatchRejection::InvalidStatusTransition,
            TransitionOutcome::JobNotFound => DispatchRejection::JobNotFound,
        };
        Ok(self.reject(reason, job_id, technician.id))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// The technician, if known and dispatch-eligible.
    async fn eligible_technician(
        &self,
        technician_id: DbId,
    ) -> Result<Option<Technician>, sqlx::Error> {
        Ok(self
            .store
            .find_technician(technician_id)
            .await?
            .filter(Technician::is_dispatch_eligible))
    }

    /// Resolve a channel handle and job number, or the rejection to return.
    async fn resolve(
        &self,
        job_number: &str,
        handle: &str,
    ) -> Result<Result<(Technician, Job), DispatchOutcome>, sqlx::Error> {
        let technician = self
            .store
            .find_technician_by_handle(handle)
            .await?
            .filter(Technician::is_dispatch_eligible);
        let Some(technician) = technician else {
            tracing::debug!(handle, job_number, "Dispatch request from unregistered handle");
            return Ok(Err(DispatchOutcome::rejected(
                DispatchRejection::TechnicianNotRegistered,
            )));
        };

        let Some(job) = self.store.find_job_by_number(job_number).await? else {
            tracing::debug!(technician_id = technician.id, job_number, "Dispatch request for unknown job");
            return Ok(Err(DispatchOutcome::rejected(DispatchRejection::JobNotFound)));
        };

        Ok(Ok((technician, job)))
    }

    fn reject(&self, reason: DispatchRejection, job_id: DbId, technician_id: DbId) -> DispatchOutcome {
        tracing::debug!(job_id, technician_id, %reason, "Dispatch request rejected");
        DispatchOutcome::rejected(reason)
    }

    /// Enqueue the customer message and publish the dashboard update.
    async fn announce(&self, job: &Job, technician: &Technician, action: JobAction) {
        match job.customer_handle.as_deref() {
            Some(handle) => {
                let text = customer_message(job, technician, action);
                if let Err(e) = self.queue.enqueue_text(handle, &text, Some(job.id)).await {
                    tracing::error!(job_id = job.id, error = %e, "Failed to enqueue customer notification");
                }
            }
            None => {
                tracing::debug!(job_id = job.id, "Job has no customer handle, skipping notification");
            }
        }

        let update = JobUpdate {
            job_id: job.id,
            job_number: job.job_number.clone(),
            action,
            status: job
                .status()
                .map(|s| status_code(s).to_string())
                .unwrap_or_default(),
            technician_id: Some(technician.id),
            customer_id: job.customer_id,
            updated_at: job.updated_at,
        };

        self.bus
            .publish(Target::role(ROLE_ADMIN), HubEvent::JobUpdate(update.clone()));
        self.bus
            .publish(Target::role(ROLE_STAFF), HubEvent::JobUpdate(update.clone()));
        if let Some(customer_id) = job.customer_id {
            self.bus
                .publish(Target::Customer(customer_id), HubEvent::JobUpdate(update));
        }
    }
}

fn status_code(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Open => "OPEN",
        JobStatus::Assigned => "ASSIGNED",
        JobStatus::InProgress => "IN_PROGRESS",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Cancelled => "CANCELLED",
    }
}

fn customer_message(job: &Job, technician: &Technician, action: JobAction) -> String {
    match action {
        JobAction::Claimed => format!(
            "Your service job {} ({}) has been assigned to {}.",
            job.job_number, job.title, technician.name
        ),
        JobAction::Started => format!(
            "{} has started work on your service job {}.",
            technician.name, job.job_number
        ),
        JobAction::Completed => match job.completion_notes.as_deref() {
            Some(notes) if !notes.is_empty() => format!(
                "Your service job {} has been completed. Notes: {}",
                job.job_number, notes
            ),
            _ => format!("Your service job {} has been completed.", job.job_number),
        },
    }
}
