//! Store traits consumed by the dispatch coordinator and delivery queue.
//!
//! The traits mirror the repository operations so the services can run
//! against Postgres in production and [`MemoryStore`](crate::MemoryStore) in
//! tests. Errors stay `sqlx::Error` so callers classify them the same way
//! regardless of backend.

use async_trait::async_trait;
use fieldops_core::types::DbId;

use crate::models::assignment::Assignment;
use crate::models::job::{ClaimOutcome, Job, TransitionOutcome};
use crate::models::notification_intent::{
    CreateNotificationIntent, NotificationIntent, NotificationStats,
};
use crate::models::status::NotificationStatus;
use crate::models::technician::Technician;
use crate::repositories::{AssignmentRepo, JobRepo, NotificationIntentRepo, TechnicianRepo};
use crate::DbPool;

/// Jobs, technicians and the atomic dispatch transitions.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn find_technician(&self, id: DbId) -> Result<Option<Technician>, sqlx::Error>;

    async fn find_technician_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<Technician>, sqlx::Error>;

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, sqlx::Error>;

    async fn find_job_by_number(&self, job_number: &str) -> Result<Option<Job>, sqlx::Error>;

    async fn list_open_jobs(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error>;

    async fn assignments_for_job(&self, job_id: DbId) -> Result<Vec<Assignment>, sqlx::Error>;

    /// Check-and-assign as one indivisible unit.
    async fn claim_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<ClaimOutcome, sqlx::Error>;

    /// `ASSIGNED -> IN_PROGRESS` for the current assignee.
    async fn start_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<TransitionOutcome, sqlx::Error>;

    /// `IN_PROGRESS -> COMPLETED` for the current assignee.
    async fn complete_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, sqlx::Error>;

    /// Confirm the backend is reachable.
    async fn health_check(&self) -> Result<(), sqlx::Error>;
}

/// Durable notification intents.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_intent(
        &self,
        input: &CreateNotificationIntent,
    ) -> Result<NotificationIntent, sqlx::Error>;

    async fn find_intent(&self, id: DbId) -> Result<Option<NotificationIntent>, sqlx::Error>;

    async fn pending_batch(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error>;

    async fn list_intents(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error>;

    async fn mark_sent(&self, id: DbId) -> Result<bool, sqlx::Error>;

    async fn record_failure(
        &self,
        id: DbId,
        error: &str,
        max_retries: i32,
    ) -> Result<Option<NotificationIntent>, sqlx::Error>;

    async fn requeue(&self, id: DbId) -> Result<bool, sqlx::Error>;

    async fn stats(&self) -> Result<NotificationStats, sqlx::Error>;
}

/// Postgres-backed store delegating to the repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DispatchStore for PgStore {
    async fn find_technician(&self, id: DbId) -> Result<Option<Technician>, sqlx::Error> {
        TechnicianRepo::find_by_id(&self.pool, id).await
    }

    async fn find_technician_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<Technician>, sqlx::Error> {
        TechnicianRepo::find_by_handle(&self.pool, handle).await
    }

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_by_id(&self.pool, id).await
    }

    async fn find_job_by_number(&self, job_number: &str) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_by_number(&self.pool, job_number).await
    }

    async fn list_open_jobs(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_open(&self.pool, limit).await
    }

    async fn assignments_for_job(&self, job_id: DbId) -> Result<Vec<Assignment>, sqlx::Error> {
        AssignmentRepo::list_for_job(&self.pool, job_id).await
    }

    async fn claim_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        JobRepo::claim(&self.pool, job_id, technician_id).await
    }

    async fn start_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        JobRepo::start(&self.pool, job_id, technician_id).await
    }

    async fn complete_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        JobRepo::complete(&self.pool, job_id, technician_id, notes).await
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        crate::health_check(&self.pool).await
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_intent(
        &self,
        input: &CreateNotificationIntent,
    ) -> Result<NotificationIntent, sqlx::Error> {
        NotificationIntentRepo::create(&self.pool, input).await
    }

    async fn find_intent(&self, id: DbId) -> Result<Option<NotificationIntent>, sqlx::Error> {
        NotificationIntentRepo::find_by_id(&self.pool, id).await
    }

    async fn pending_batch(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        NotificationIntentRepo::pending_batch(&self.pool, limit, max_retries).await
    }

    async fn list_intents(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        NotificationIntentRepo::list(&self.pool, status, limit).await
    }

    async fn mark_sent(&self, id: DbId) -> Result<bool, sqlx::Error> {
        NotificationIntentRepo::mark_sent(&self.pool, id).await
    }

    async fn record_failure(
        &self,
        id: DbId,
        error: &str,
        max_retries: i32,
    ) -> Result<Option<NotificationIntent>, sqlx::Error> {
        NotificationIntentRepo::record_failure(&self.pool, id, error, max_retries).await
    }

    async fn requeue(&self, id: DbId) -> Result<bool, sqlx::Error> {
        NotificationIntentRepo::requeue(&self.pool, id).await
    }

    async fn stats(&self) -> Result<NotificationStats, sqlx::Error> {
        NotificationIntentRepo::stats(&self.pool).await
    }
}
