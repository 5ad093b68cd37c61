//! Operator endpoints for the notification delivery queue (admin only).

use axum::extract::{Path, Query, State};
use axum::Json;
use fieldops_core::error::CoreError;
use fieldops_core::types::DbId;
use fieldops_db::models::notification_intent::{NotificationIntent, NotificationStats};
use fieldops_db::models::status::NotificationStatus;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Default and maximum page size for the intent listing.
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// `pending`, `sent` or `failed` (case-insensitive).
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueueStats {
    #[serde(flatten)]
    pub counts: NotificationStats,
    pub total: i64,
    pub channel_connected: bool,
}

#[derive(Debug, Serialize)]
pub struct RequeueResult {
    pub id: DbId,
    pub requeued: bool,
}

fn parse_status(raw: &str) -> AppResult<NotificationStatus> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PENDING" => Ok(NotificationStatus::Pending),
        "SENT" => Ok(NotificationStatus::Sent),
        "FAILED" => Ok(NotificationStatus::Failed),
        other => Err(AppError::BadRequest(format!(
            "Unknown notification status '{other}'"
        ))),
    }
}

/// GET /api/v1/notifications/stats
pub async fn stats(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<QueueStats>>> {
    let counts = state.queue.stats().await?;
    Ok(Json(DataResponse {
        data: QueueStats {
            counts,
            total: counts.total(),
            channel_connected: state.queue.gateway_connected(),
        },
    }))
}

/// GET /api/v1/notifications?status=&limit=
pub async fn list(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<DataResponse<Vec<NotificationIntent>>>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let intents = state.queue.list(status, limit).await?;
    Ok(Json(DataResponse { data: intents }))
}

/// POST /api/v1/notifications/{id}/requeue
///
/// Only `FAILED` intents can be requeued; anything else is a 409.
pub async fn requeue(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<RequeueResult>>> {
    if !state.queue.requeue(id).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Notification {id} does not exist or is not FAILED"
        ))));
    }
    tracing::info!(intent_id = id, admin_id = admin.user_id, "Notification requeued by operator");
    Ok(Json(DataResponse {
        data: RequeueResult { id, requeued: true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_is_case_insensitive() {
        assert_eq!(parse_status("failed").unwrap(), NotificationStatus::Failed);
        assert_eq!(parse_status(" SENT ").unwrap(), NotificationStatus::Sent);
        assert!(parse_status("archived").is_err());
    }
}
