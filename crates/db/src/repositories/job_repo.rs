//! Repository for the `jobs` table, including the dispatch transactions.
//!
//! Every transition locks the job row with `SELECT ... FOR UPDATE` before
//! checking assignments and status, so concurrent requests for the same job
//! serialize on the row lock and the first committed writer wins.

use fieldops_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::is_unique_violation;
use crate::models::assignment::{Assignment, ROLE_PRIMARY};
use crate::models::job::{ClaimOutcome, CreateJob, Job, TransitionOutcome};
use crate::models::status::JobStatus;
use crate::repositories::assignment_repo::{AssignmentRepo, COLUMNS as ASSIGNMENT_COLUMNS};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_number, title, status_id, priority, customer_id, customer_handle, \
    completion_notes, assigned_at, started_at, completed_at, created_at, updated_at";

/// Name of the partial unique index guarding live assignments.
const LIVE_ASSIGNMENT_CONSTRAINT: &str = "uq_job_assignments_live";

/// Provides CRUD and dispatch operations for field jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new `OPEN` job.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_number, title, status_id, priority, customer_id, customer_handle) \
             VALUES ($1, $2, $3, COALESCE($4, 0), $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.job_number)
            .bind(&input.title)
            .bind(JobStatus::Open.id())
            .bind(input.priority)
            .bind(input.customer_id)
            .bind(&input.customer_handle)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its human-readable number (e.g. `JOB-0001`).
    pub async fn find_by_number(
        pool: &PgPool,
        job_number: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_number = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_number)
            .fetch_optional(pool)
            .await
    }

    /// List `OPEN` jobs, highest priority first, then oldest first.
    pub async fn list_open(pool: &PgPool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id = $1 \
             ORDER BY priority DESC, created_at ASC, id ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Open.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Atomically claim a job for a technician.
    ///
    /// In one transaction: lock the job row, require zero live assignments
    /// and a claimable status (`OPEN`, or `ASSIGNED` left without an
    /// assignment), insert the assignment, and move the job to `ASSIGNED`.
    /// Any early return drops the transaction, which rolls it back.
    pub async fn claim(
        pool: &PgPool,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(job) = Self::lock(&mut tx, job_id).await? else {
            return Ok(ClaimOutcome::JobNotFound);
        };

        let live = AssignmentRepo::count_live(&mut tx, job_id).await?;
        if live > 0 {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        if !matches!(job.status(), Some(JobStatus::Open | JobStatus::Assigned)) {
            return Ok(ClaimOutcome::NotClaimable {
                current: job.status_id,
            });
        }

        let insert = format!(
            "INSERT INTO job_assignments (job_id, technician_id, role) \
             VALUES ($1, $2, $3) \
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        let assignment = match sqlx::query_as::<_, Assignment>(&insert)
            .bind(job_id)
            .bind(technician_id)
            .bind(ROLE_PRIMARY)
            .fetch_one(&mut *tx)
            .await
        {
            Ok(a) => a,
            Err(e) if is_unique_violation(&e, LIVE_ASSIGNMENT_CONSTRAINT) => {
                tracing::warn!(job_id, technician_id, "Live assignment index rejected claim");
                return Ok(ClaimOutcome::AlreadyClaimed);
            }
            Err(e) => return Err(e),
        };

        let update = format!(
            "UPDATE jobs \
             SET status_id = $2, assigned_at = NOW(), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&update)
            .bind(job_id)
            .bind(JobStatus::Assigned.id())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ClaimOutcome::Claimed { job, assignment })
    }

    /// Move an `ASSIGNED` job to `IN_PROGRESS` on behalf of its assignee.
    ///
    /// Stamps `accepted_at` on the assignment and `started_at` on the job.
    pub async fn start(
        pool: &PgPool,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let assignment = match Self::check_transition(
            &mut tx,
            job_id,
            technician_id,
            JobStatus::Assigned,
        )
        .await?
        {
            Ok(assignment) => assignment,
            Err(outcome) => return Ok(outcome),
        };

        let stamp = format!(
            "UPDATE job_assignments SET accepted_at = NOW() WHERE id = $1 \
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        let assignment = sqlx::query_as::<_, Assignment>(&stamp)
            .bind(assignment.id)
            .fetch_one(&mut *tx)
            .await?;

        let update = format!(
            "UPDATE jobs \
             SET status_id = $2, started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&update)
            .bind(job_id)
            .bind(JobStatus::InProgress.id())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied { job, assignment })
    }

    /// Move an `IN_PROGRESS` job to `COMPLETED` on behalf of its assignee.
    ///
    /// Stores the completion notes and stamps `completed_at` on both the job
    /// and the assignment, which releases the live-assignment slot.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        technician_id: DbId,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let assignment = match Self::check_transition(
            &mut tx,
            job_id,
            technician_id,
            JobStatus::InProgress,
        )
        .await?
        {
            Ok(assignment) => assignment,
            Err(outcome) => return Ok(outcome),
        };

        let stamp = format!(
            "UPDATE job_assignments SET completed_at = NOW() WHERE id = $1 \
             RETURNING {ASSIGNMENT_COLUMNS}"
        );
        let assignment = sqlx::query_as::<_, Assignment>(&stamp)
            .bind(assignment.id)
            .fetch_one(&mut *tx)
            .await?;

        let update = format!(
            "UPDATE jobs \
             SET status_id = $2, completion_notes = $3, completed_at = NOW(), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&update)
            .bind(job_id)
            .bind(JobStatus::Completed.id())
            .bind(notes)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied { job, assignment })
    }

    /// Lock a job row for the remainder of the transaction.
    async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        job_id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Shared precondition check for start/complete.
    ///
    /// Locks the job, then requires the caller to hold the most recent
    /// assignment and the job to be in `required` status. On success returns
    /// the caller's assignment; otherwise the typed rejection.
    async fn check_transition(
        tx: &mut Transaction<'_, Postgres>,
        job_id: DbId,
        technician_id: DbId,
        required: JobStatus,
    ) -> Result<Result<Assignment, TransitionOutcome>, sqlx::Error> {
        let Some(job) = Self::lock(tx, job_id).await? else {
            return Ok(Err(TransitionOutcome::JobNotFound));
        };

        let current = AssignmentRepo::find_latest_for_job(tx, job_id).await?;
        let assignment = match current {
            Some(a) if a.technician_id == technician_id => a,
            _ => return Ok(Err(TransitionOutcome::NotAssignee)),
        };

        if job.status() != Some(required) {
            return Ok(Err(TransitionOutcome::InvalidTransition {
                current: job.status_id,
            }));
        }

        Ok(Ok(assignment))
    }
}
