use axum::routing::{get, post};
use axum::Router;

use crate::handlers::dispatch;
use crate::state::AppState;

/// Technician dispatch routes, mounted at `/dispatch`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/open", get(dispatch::list_open_jobs))
        .route("/jobs/{job_number}/claim", post(dispatch::claim_job))
        .route("/jobs/{job_number}/start", post(dispatch::start_job))
        .route("/jobs/{job_number}/complete", post(dispatch::complete_job))
}
