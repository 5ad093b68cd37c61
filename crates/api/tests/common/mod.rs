#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use fieldops_core::clock::{Clock, ManualClock};
use fieldops_core::types::DbId;
use fieldops_db::models::job::{CreateJob, Job};
use fieldops_db::models::technician::{CreateTechnician, Technician};
use fieldops_db::{DispatchStore, MemoryStore, NotificationStore};
use fieldops_events::queue::QueueConfig;
use fieldops_events::{ChannelGateway, DisconnectedGateway};
use http_body_util::BodyExt;
use tower::ServiceExt;

use fieldops_api::auth::jwt::{generate_access_token, JwtConfig};
use fieldops_api::config::{HubConfig, ServerConfig};
use fieldops_api::router::build_app_router;
use fieldops_api::state::AppState;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Build a test `ServerConfig` with safe defaults.
///
/// No send delay, so queue drains in tests finish immediately.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        queue: QueueConfig {
            send_delay: Duration::ZERO,
            ..QueueConfig::default()
        },
        hub: HubConfig::default(),
        channel_bridge_url: None,
        channel_probe_interval_secs: 15,
    }
}

/// Everything a test needs to drive the app and inspect its effects.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

/// Build the full application router over an in-memory store, a
/// disconnected channel and a manual clock.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config(), Arc::new(DisconnectedGateway))
}

pub fn build_test_app_with(config: ServerConfig, gateway: Arc<dyn ChannelGateway>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());

    let state = AppState::new(
        config.clone(),
        Arc::clone(&store) as Arc<dyn DispatchStore>,
        Arc::clone(&store) as Arc<dyn NotificationStore>,
        gateway,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let app = build_app_router(state.clone(), &config);

    TestApp {
        app,
        state,
        store,
        clock,
    }
}

/// Mint an access token signed with the test secret.
pub fn token(user_id: DbId, role: &str, customer_id: Option<DbId>) -> String {
    generate_access_token(user_id, role, customer_id, &test_config().jwt)
        .expect("token generation should succeed")
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn technician(store: &MemoryStore, handle: &str, name: &str) -> Technician {
    store.insert_technician(&CreateTechnician {
        handle: handle.to_string(),
        name: name.to_string(),
        is_active: Some(true),
        is_admin: Some(false),
    })
}

pub fn job(store: &MemoryStore, job_number: &str, customer_handle: Option<&str>) -> Job {
    store.insert_job(&CreateJob {
        job_number: job_number.to_string(),
        title: format!("Service call {job_number}"),
        priority: None,
        customer_id: Some(7),
        customer_handle: customer_handle.map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}
