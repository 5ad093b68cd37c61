use axum::routing::{get, post};
use axum::Router;

use crate::handlers::notifications;
use crate::state::AppState;

/// Notification queue operator routes, mounted at `/notifications`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list))
        .route("/stats", get(notifications::stats))
        .route("/{id}/requeue", post(notifications::requeue))
}
