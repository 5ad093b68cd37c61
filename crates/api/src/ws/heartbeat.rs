use std::sync::Arc;
use std::time::Duration;

use fieldops_core::rate_limit::ConnectionRateLimiter;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::ws::manager::WsManager;

/// Floor for the sweep interval; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Spawn the heartbeat sweep.
///
/// Every `sweep_interval` it disconnects connections silent for longer than
/// `heartbeat_timeout` and prunes elapsed rate-limit windows. A connection
/// that stops sending heartbeats is therefore dropped within
/// `heartbeat_timeout + sweep_interval`. Runs until `cancel` fires.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    rate_limiter: Arc<ConnectionRateLimiter>,
    config: &HubConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let sweep_interval = config.sweep_interval.max(MIN_SWEEP_INTERVAL);
    let timeout = chrono::Duration::from_std(config.heartbeat_timeout)
        .unwrap_or_else(|_| chrono::Duration::seconds(30));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Heartbeat sweep cancelled");
                    break;
                }
                _ = interval.tick() => {
                    sweep(&ws_manager, &rate_limiter, timeout);
                }
            }
        }
    })
}

fn sweep(ws_manager: &WsManager, rate_limiter: &ConnectionRateLimiter, timeout: chrono::Duration) {
    let reaped = ws_manager.reap_stale(timeout);
    let pruned = rate_limiter.prune_expired();
    tracing::debug!(
        reaped = reaped.len(),
        pruned,
        count = ws_manager.connection_count(),
        "WebSocket heartbeat sweep"
    );
}
