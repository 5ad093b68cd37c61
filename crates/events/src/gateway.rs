//! External messaging channel seam.
//!
//! The delivery queue talks to the messaging transport only through
//! [`ChannelGateway`]: a connectivity flag and a `send(handle, text)`.
//! [`HttpBridgeGateway`] reaches a bridge process over HTTP;
//! [`DisconnectedGateway`] stands in when no bridge is configured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// HTTP request timeout for a single bridge call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Why a send through the gateway failed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The channel is not connected.
    #[error("Channel is not connected")]
    NotConnected,

    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The bridge returned a non-2xx status code.
    #[error("Bridge returned HTTP {0}")]
    HttpStatus(u16),

    /// The bridge refused this particular message with a 4xx response.
    #[error("Send rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Narrow interface to the external messaging transport.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Whether the transport can currently deliver messages.
    fn is_connected(&self) -> bool;

    /// Deliver `text` to the channel `handle` (e.g. a phone number).
    async fn send(&self, handle: &str, text: &str) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// DisconnectedGateway
// ---------------------------------------------------------------------------

/// Gateway that is never connected. Intents stay `PENDING` until a real
/// transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedGateway;

#[async_trait]
impl ChannelGateway for DisconnectedGateway {
    fn is_connected(&self) -> bool {
        false
    }

    async fn send(&self, _handle: &str, _text: &str) -> Result<(), GatewayError> {
        Err(GatewayError::NotConnected)
    }
}

// ---------------------------------------------------------------------------
// HttpBridgeGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    connected: bool,
}

/// Gateway backed by an HTTP bridge exposing `POST /send` and `GET /status`.
///
/// Connectivity is a cached flag refreshed by [`probe`](Self::probe), so
/// `is_connected` never performs I/O.
pub struct HttpBridgeGateway {
    client: reqwest::Client,
    base_url: String,
    connected: AtomicBool,
}

impl HttpBridgeGateway {
    /// Create a gateway for the bridge at `base_url`. Starts disconnected
    /// until the first successful probe.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the bridge whether it is connected and cache the answer.
    ///
    /// Any request failure counts as disconnected.
    pub async fn probe(&self) -> bool {
        let connected = match self.fetch_status().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::debug!(error = %e, url = %self.base_url, "Channel bridge probe failed");
                false
            }
        };
        let previous = self.connected.swap(connected, Ordering::Relaxed);
        if previous != connected {
            tracing::info!(connected, url = %self.base_url, "Channel bridge connectivity changed");
        }
        connected
    }

    /// Probe every `interval` until `cancel` fires.
    pub async fn run_probe(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Channel bridge probe cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.probe().await;
                }
            }
        }
    }

    async fn fetch_status(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::HttpStatus(response.status().as_u16()));
        }
        let status: StatusResponse = response.json().await?;
        Ok(status.connected)
    }
}

#[async_trait]
impl ChannelGateway for HttpBridgeGateway {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// A transport failure clears the cached connectivity flag so the queue
    /// stops the current batch instead of burning retries until the next probe.
    async fn send(&self, handle: &str, text: &str) -> Result<(), GatewayError> {
        let response = match self
            .client
            .post(format!("{}/send", self.base_url))
            .json(&SendRequest { to: handle, text })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if self.connected.swap(false, Ordering::Relaxed) {
                    tracing::warn!(
                        error = %e,
                        url = %self.base_url,
                        "Channel bridge unreachable, marking disconnected"
                    );
                }
                return Err(GatewayError::Request(e));
            }
        };

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            let reason = match body.trim() {
                "" => status.to_string(),
                trimmed => trimmed.to_string(),
            };
            return Err(GatewayError::Rejected(reason));
        }
        if !status.is_success() {
            return Err(GatewayError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Address of a port that was just released, so connections are refused.
    async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// One-shot HTTP server that answers the first request with `status`
    /// and `body`.
    async fn one_shot_bridge(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn disconnected_gateway_refuses_sends() {
        let gateway = DisconnectedGateway;
        assert!(!gateway.is_connected());
        assert!(matches!(
            gateway.send("+15550000001", "hi").await,
            Err(GatewayError::NotConnected)
        ));
    }

    #[test]
    fn bridge_starts_disconnected_and_trims_url() {
        let gateway = HttpBridgeGateway::new("http://127.0.0.1:9/").unwrap();
        assert!(!gateway.is_connected());
        assert_eq!(gateway.base_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn failed_probe_counts_as_disconnected() {
        let gateway = HttpBridgeGateway::new(refused_url().await).unwrap();
        assert!(!gateway.probe().await);
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn request_failure_during_send_clears_connectivity() {
        let gateway = HttpBridgeGateway::new(refused_url().await).unwrap();
        gateway.connected.store(true, Ordering::Relaxed);

        let result = gateway.send("+15550000001", "hi").await;

        assert!(matches!(result, Err(GatewayError::Request(_))));
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn client_error_from_bridge_is_a_rejection() {
        let url = one_shot_bridge("400 Bad Request", "invalid number").await;
        let gateway = HttpBridgeGateway::new(url).unwrap();
        gateway.connected.store(true, Ordering::Relaxed);

        let result = gateway.send("not-a-number", "hi").await;

        match result {
            Err(GatewayError::Rejected(reason)) => assert_eq!(reason, "invalid number"),
            other => panic!("expected Rejected, got {other:?}"),
        }
        // A refused message says nothing about the link itself.
        assert!(gateway.is_connected());
    }

    #[tokio::test]
    async fn server_error_from_bridge_keeps_status_code() {
        let url = one_shot_bridge("503 Service Unavailable", "").await;
        let gateway = HttpBridgeGateway::new(url).unwrap();
        gateway.connected.store(true, Ordering::Relaxed);

        let result = gateway.send("+15550000001", "hi").await;

        assert!(matches!(result, Err(GatewayError::HttpStatus(503))));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            GatewayError::HttpStatus(503).to_string(),
            "Bridge returned HTTP 503"
        );
        assert_eq!(
            GatewayError::Rejected("invalid number".to_string()).to_string(),
            "Send rejected: invalid number"
        );
    }
}
