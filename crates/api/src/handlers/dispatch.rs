//! Handlers for the `/dispatch` resource.
//!
//! Called by the messaging front end on behalf of technicians, identified
//! by their channel handle. Rejections are `200 {"ok": false, "reason"}`.

use axum::extract::{Path, Query, State};
use axum::Json;
use fieldops_db::models::job::Job;
use serde::Deserialize;

use crate::dispatch::{DispatchOutcome, OPEN_JOBS_LIMIT};
use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireDispatcher;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for claim and start.
#[derive(Debug, Deserialize)]
pub struct TechnicianRequest {
    pub technician_handle: String,
}

/// Body for complete.
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub technician_handle: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenJobsQuery {
    pub limit: Option<i64>,
}

fn require_handle(handle: &str) -> AppResult<&str> {
    let handle = handle.trim();
    if handle.is_empty() {
        return Err(AppError::BadRequest("technician_handle must not be empty".into()));
    }
    Ok(handle)
}

/// GET /api/v1/dispatch/jobs/open
pub async fn list_open_jobs(
    RequireDispatcher(_user): RequireDispatcher,
    State(state): State<AppState>,
    Query(query): Query<OpenJobsQuery>,
) -> AppResult<Json<DataResponse<Vec<Job>>>> {
    let jobs = state
        .coordinator
        .open_jobs(query.limit.unwrap_or(OPEN_JOBS_LIMIT))
        .await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// POST /api/v1/dispatch/jobs/{job_number}/claim
pub async fn claim_job(
    RequireDispatcher(user): RequireDispatcher,
    State(state): State<AppState>,
    Path(job_number): Path<String>,
    Json(input): Json<TechnicianRequest>,
) -> AppResult<Json<DispatchOutcome>> {
    let handle = require_handle(&input.technician_handle)?;
    tracing::debug!(caller = user.user_id, %job_number, handle, "Claim requested");
    let outcome = state.coordinator.claim_by_number(&job_number, handle).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/dispatch/jobs/{job_number}/start
pub async fn start_job(
    RequireDispatcher(user): RequireDispatcher,
    State(state): State<AppState>,
    Path(job_number): Path<String>,
    Json(input): Json<TechnicianRequest>,
) -> AppResult<Json<DispatchOutcome>> {
    let handle = require_handle(&input.technician_handle)?;
    tracing::debug!(caller = user.user_id, %job_number, handle, "Start requested");
    let outcome = state.coordinator.start_by_number(&job_number, handle).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/dispatch/jobs/{job_number}/complete
pub async fn complete_job(
    RequireDispatcher(user): RequireDispatcher,
    State(state): State<AppState>,
    Path(job_number): Path<String>,
    Json(input): Json<CompleteRequest>,
) -> AppResult<Json<DispatchOutcome>> {
    let handle = require_handle(&input.technician_handle)?;
    tracing::debug!(caller = user.user_id, %job_number, handle, "Completion requested");
    let notes = input
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let outcome = state
        .coordinator
        .complete_by_number(&job_number, handle, notes)
        .await?;
    Ok(Json(outcome))
}
