//! Repository for the `notification_intents` table.
//!
//! Status writes are conditional on the current status so an intent only
//! ever moves `PENDING -> PENDING | SENT | FAILED`, or `FAILED -> PENDING`
//! through an explicit requeue.

use fieldops_core::types::DbId;
use sqlx::PgPool;

use crate::models::notification_intent::{
    CreateNotificationIntent, NotificationIntent, NotificationStats,
};
use crate::models::status::{NotificationStatus, StatusId};

/// Column list for `notification_intents` queries.
const COLUMNS: &str = "\
    id, recipient, payload, channel, status_id, retry_count, last_error, job_id, \
    created_at, sent_at, updated_at";

pub struct NotificationIntentRepo;

impl NotificationIntentRepo {
    /// Persist a new `PENDING` intent.
    pub async fn create(
        pool: &PgPool,
        input: &CreateNotificationIntent,
    ) -> Result<NotificationIntent, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_intents (recipient, payload, channel, status_id, job_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationIntent>(&query)
            .bind(&input.recipient)
            .bind(&input.payload)
            .bind(&input.channel)
            .bind(NotificationStatus::Pending.id())
            .bind(input.job_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<NotificationIntent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_intents WHERE id = $1");
        sqlx::query_as::<_, NotificationIntent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Oldest `PENDING` intents that still have retry budget.
    pub async fn pending_batch(
        pool: &PgPool,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_intents \
             WHERE status_id = $1 AND retry_count < $2 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, NotificationIntent>(&query)
            .bind(NotificationStatus::Pending.id())
            .bind(max_retries)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List intents, optionally filtered by status, newest first.
    pub async fn list(
        pool: &PgPool,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_intents \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, NotificationIntent>(&query)
            .bind(status.map(NotificationStatus::id))
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark a pending intent as delivered. Returns `false` if it was not
    /// pending.
    pub async fn mark_sent(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_intents \
             SET status_id = $2, sent_at = NOW(), last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(NotificationStatus::Sent.id())
        .bind(NotificationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed delivery attempt.
    ///
    /// Increments `retry_count` and moves the intent to `FAILED` once it
    /// reaches `max_retries`. Returns the updated row, or `None` if the
    /// intent was not pending.
    pub async fn record_failure(
        pool: &PgPool,
        id: DbId,
        error: &str,
        max_retries: i32,
    ) -> Result<Option<NotificationIntent>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_intents \
             SET retry_count = retry_count + 1, \
                 last_error = $2, \
                 status_id = CASE WHEN retry_count + 1 >= $3 THEN $4 ELSE status_id END, \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationIntent>(&query)
            .bind(id)
            .bind(error)
            .bind(max_retries)
            .bind(NotificationStatus::Failed.id())
            .bind(NotificationStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Reset a `FAILED` intent to `PENDING` with a fresh retry budget.
    pub async fn requeue(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_intents \
             SET status_id = $2, retry_count = 0, last_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(NotificationStatus::Pending.id())
        .bind(NotificationStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Counts grouped by status.
    pub async fn stats(pool: &PgPool) -> Result<NotificationStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> = sqlx::query_as(
            "SELECT status_id, COUNT(*) FROM notification_intents GROUP BY status_id",
        )
        .fetch_all(pool)
        .await?;

        let mut stats = NotificationStats::default();
        for (status_id, count) in rows {
            stats.add(status_id, count);
        }
        Ok(stats)
    }
}
