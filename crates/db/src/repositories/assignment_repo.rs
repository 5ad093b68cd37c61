//! Repository for the `job_assignments` table.

use fieldops_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::assignment::Assignment;

/// Column list for `job_assignments` queries.
pub(crate) const COLUMNS: &str =
    "id, job_id, technician_id, role, assigned_at, accepted_at, completed_at";

/// Read access to job assignments. Inserts happen only inside
/// [`JobRepo::claim`](crate::repositories::JobRepo::claim).
pub struct AssignmentRepo;

impl AssignmentRepo {
    /// All assignments ever made for a job, oldest first.
    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<Assignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_assignments WHERE job_id = $1 ORDER BY assigned_at, id"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Count live (not yet completed) assignments within a transaction.
    pub(crate) async fn count_live(
        tx: &mut Transaction<'_, Postgres>,
        job_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_assignments WHERE job_id = $1 AND completed_at IS NULL",
        )
        .bind(job_id)
        .fetch_one(&mut **tx)
        .await
    }

    /// The most recent assignment for a job within a transaction.
    pub(crate) async fn find_latest_for_job(
        tx: &mut Transaction<'_, Postgres>,
        job_id: DbId,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_assignments \
             WHERE job_id = $1 \
             ORDER BY assigned_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await
    }
}
