pub mod dispatch;
pub mod health;
pub mod notifications;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                      WebSocket (token query or bearer)
///
/// /dispatch/jobs/open                      open jobs (dispatcher)
/// /dispatch/jobs/{job_number}/claim        claim (POST)
/// /dispatch/jobs/{job_number}/start        start (POST)
/// /dispatch/jobs/{job_number}/complete     complete (POST)
///
/// /notifications                           list intents (admin)
/// /notifications/stats                     counts + channel connectivity
/// /notifications/{id}/requeue              requeue a FAILED intent (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/dispatch", dispatch::router())
        .nest("/notifications", notifications::router())
}
