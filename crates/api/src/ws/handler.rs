use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::Response;
use fieldops_core::error::CoreError;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::auth::jwt::validate_token;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::bearer_token;
use crate::state::AppState;
use crate::ws::manager::{ConnIdentity, WsManager};
use crate::ws::protocol::{ClientMessage, ServerMessage};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Source address of the request, or `0.0.0.0` when the server was not
/// started with connect info.
pub struct ClientAddr(pub IpAddr);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let addr = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Ok(Self(addr))
    }
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// Admission is checked before the upgrade: an address over its attempt
/// budget gets HTTP 429. Authentication is checked after it, so a client
/// with a missing or bad token receives one `error` frame and a Close, and
/// is never registered.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    if let Err(limited) = state.rate_limiter.check(addr) {
        tracing::warn!(
            %addr,
            retry_after_secs = limited.retry_after_secs,
            "WebSocket connection rate limited"
        );
        return Err(AppError::Core(CoreError::RateLimited(limited.to_string())));
    }

    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));

    let identity = match token {
        None => Err("Authentication required"),
        Some(token) => validate_token(token, &state.config.jwt)
            .map(|claims| ConnIdentity {
                user_id: claims.sub,
                role: claims.role,
                customer_id: claims.customer_id,
            })
            .map_err(|_| "Invalid or expired token"),
    };

    let manager = Arc::clone(&state.ws_manager);
    Ok(ws.on_upgrade(move |socket| async move {
        match identity {
            Ok(identity) => handle_socket(socket, manager, identity, addr).await,
            Err(reason) => reject_socket(socket, reason, addr).await,
        }
    }))
}

/// Tell an unauthenticated client why, then close.
async fn reject_socket(mut socket: WebSocket, reason: &'static str, addr: IpAddr) {
    tracing::warn!(%addr, reason, "Rejected unauthenticated WebSocket");
    let frame = ServerMessage::error(reason).to_json();
    let _ = socket.send(Message::Text(frame.into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

/// Manage a single authenticated connection after upgrade.
///
/// Registers the connection, spawns a sender task that forwards the
/// manager's channel to the sink, and processes inbound frames until the
/// client leaves or the manager closes the connection (reap, shutdown).
async fn handle_socket(
    socket: WebSocket,
    manager: Arc<WsManager>,
    identity: ConnIdentity,
    addr: IpAddr,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        conn_id = %conn_id,
        user_id = identity.user_id,
        role = %identity.role,
        %addr,
        "WebSocket connected"
    );

    let mut rx = manager.add(conn_id.clone(), identity, addr);
    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the sink, stop after Close.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_text(&manager, &conn_id, text.as_str()),
                Some(Ok(Message::Binary(_))) => {
                    manager.send(&conn_id, &ServerMessage::error("Binary frames are not supported"));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    manager.remove(&conn_id);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Dispatch one inbound text frame and reply.
fn handle_text(manager: &WsManager, conn_id: &str, text: &str) {
    let reply = match ClientMessage::parse(text) {
        Ok(ClientMessage::JoinRoom { customer_id }) => match manager.join_rooms(conn_id, customer_id) {
            Ok(rooms) => {
                tracing::debug!(conn_id, ?rooms, "Joined rooms");
                ServerMessage::RoomJoined { rooms }
            }
            Err(e) => {
                tracing::warn!(conn_id, ?customer_id, error = %e, "Room join refused");
                ServerMessage::error(e.to_string())
            }
        },
        Ok(ClientMessage::Heartbeat) => match manager.touch_heartbeat(conn_id) {
            Some(timestamp) => ServerMessage::HeartbeatAck { timestamp },
            None => return,
        },
        Err(e) => {
            tracing::debug!(conn_id, error = %e, "Unrecognized WebSocket frame");
            ServerMessage::error(e.to_string())
        }
    };
    manager.send(conn_id, &reply);
}
