use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fieldops_core::clock::{Clock, SystemClock};
use fieldops_db::{DispatchStore, NotificationStore, PgStore};
use fieldops_events::{ChannelGateway, DisconnectedGateway, HttpBridgeGateway};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldops_api::config::ServerConfig;
use fieldops_api::router::build_app_router;
use fieldops_api::state::AppState;
use fieldops_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldops_api=debug,fieldops_events=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = fieldops_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    fieldops_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    fieldops_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool));
    let cancel = CancellationToken::new();

    // --- Messaging channel ---
    let mut probe_handle = None;
    let gateway: Arc<dyn ChannelGateway> = match config.channel_bridge_url.as_deref() {
        Some(url) => {
            let bridge = Arc::new(
                HttpBridgeGateway::new(url).expect("Failed to build channel bridge client"),
            );
            let interval = Duration::from_secs(config.channel_probe_interval_secs.max(1));
            let probe = Arc::clone(&bridge);
            let probe_cancel = cancel.clone();
            probe_handle = Some(tokio::spawn(async move {
                probe.run_probe(interval, probe_cancel).await;
            }));
            tracing::info!(url, "Channel bridge configured");
            bridge
        }
        None => {
            tracing::warn!("CHANNEL_BRIDGE_URL not set, notifications will stay pending");
            Arc::new(DisconnectedGateway)
        }
    };

    // --- App state ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(
        config.clone(),
        Arc::clone(&store) as Arc<dyn DispatchStore>,
        store as Arc<dyn NotificationStore>,
        gateway,
        clock,
    );

    // --- Background services ---
    let relay_handle = tokio::spawn(
        ws::EventRelay::new(Arc::clone(&state.ws_manager)).run(state.event_bus.subscribe()),
    );

    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&state.ws_manager),
        Arc::clone(&state.rate_limiter),
        &config.hub,
        cancel.clone(),
    );

    let queue = Arc::clone(&state.queue);
    let queue_cancel = cancel.clone();
    let queue_handle = tokio::spawn(async move {
        queue.run(queue_cancel).await;
    });

    tracing::info!("Background services started (relay, heartbeat, notification queue)");

    let ws_manager = Arc::clone(&state.ws_manager);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    cancel.cancel();
    if tokio::time::timeout(grace, queue_handle).await.is_err() {
        tracing::warn!("Notification queue did not stop within the shutdown timeout");
    }
    let _ = tokio::time::timeout(grace, heartbeat_handle).await;
    if let Some(handle) = probe_handle {
        let _ = tokio::time::timeout(grace, handle).await;
    }

    tracing::info!(
        ws_count = ws_manager.connection_count(),
        "Closing remaining WebSocket connections"
    );
    ws_manager.shutdown_all();

    // The coordinator and queue keep bus senders alive, so stop the relay directly.
    relay_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
