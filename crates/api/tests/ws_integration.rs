//! End-to-end tests for the `/api/v1/ws` hub endpoint over a real socket.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{token, TestApp};
use fieldops_api::ws::EventRelay;
use fieldops_core::roles::{ROLE_ADMIN, ROLE_CUSTOMER};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serve the app on an ephemeral port with connect info, plus the relay.
async fn serve(t: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = t.app.clone();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    tokio::spawn(
        EventRelay::new(Arc::clone(&t.state.ws_manager)).run(t.state.event_bus.subscribe()),
    );
    addr
}

async fn connect(addr: SocketAddr, token: &str) -> Client {
    let (socket, _) = connect_async(format!("ws://{addr}/api/v1/ws?token={token}"))
        .await
        .expect("upgrade should succeed");
    socket
}

/// Next frame that is not a ping/pong, within five seconds.
async fn next_frame(socket: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(msg)) => return msg,
                other => panic!("socket ended unexpectedly: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn next_json(socket: &mut Client) -> serde_json::Value {
    match next_frame(socket).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn send_json(socket: &mut Client, value: serde_json::Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_token_gets_error_frame_then_close() {
    let t = common::build_test_app();
    let addr = serve(&t).await;

    let mut socket = connect(addr, "not-a-jwt").await;

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["data"]["message"], "Invalid or expired token");
    assert!(matches!(next_frame(&mut socket).await, Message::Close(_)));
    assert_eq!(t.state.ws_manager.connection_count(), 0);
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let t = common::build_test_app();
    let addr = serve(&t).await;

    let mut request = format!("ws://{addr}/api/v1/ws").into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token(1, ROLE_ADMIN, None)).parse().unwrap(),
    );
    let (mut socket, _) = connect_async(request).await.unwrap();

    send_json(&mut socket, serde_json::json!({ "type": "heartbeat" })).await;

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "heartbeat-ack");
    assert!(frame["data"]["timestamp"].is_string());
}

// ---------------------------------------------------------------------------
// Rooms and delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_room_then_receive_job_update() {
    let t = common::build_test_app();
    let addr = serve(&t).await;
    common::technician(&t.store, "+15550001", "Ada");
    common::job(&t.store, "JOB-0001", None);

    let mut socket = connect(addr, &token(1, ROLE_ADMIN, None)).await;
    send_json(&mut socket, serde_json::json!({ "type": "join-room", "data": {} })).await;

    let joined = next_json(&mut socket).await;
    assert_eq!(joined["type"], "room-joined");
    assert_eq!(joined["data"]["rooms"], serde_json::json!(["role:admin", "user:1"]));

    let outcome = t
        .state
        .coordinator
        .claim_by_number("JOB-0001", "+15550001")
        .await
        .unwrap();
    assert!(outcome.ok);

    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "job-update");
    assert_eq!(event["data"]["jobNumber"], "JOB-0001");
    assert_eq!(event["data"]["action"], "claimed");
}

#[tokio::test]
async fn customer_cannot_join_foreign_room() {
    let t = common::build_test_app();
    let addr = serve(&t).await;

    let mut socket = connect(addr, &token(5, ROLE_CUSTOMER, Some(7))).await;
    send_json(
        &mut socket,
        serde_json::json!({ "type": "join-room", "data": { "customerId": 8 } }),
    )
    .await;

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(t.state.ws_manager.room_size("customer:8"), 0);
}

#[tokio::test]
async fn unknown_message_type_gets_error_frame() {
    let t = common::build_test_app();
    let addr = serve(&t).await;

    let mut socket = connect(addr, &token(1, ROLE_ADMIN, None)).await;
    send_json(&mut socket, serde_json::json!({ "type": "subscribe-everything" })).await;

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["data"]["message"]
        .as_str()
        .unwrap()
        .contains("subscribe-everything"));
}

// ---------------------------------------------------------------------------
// Admission control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sixth_connection_in_window_is_rejected_with_429() {
    let t = common::build_test_app();
    let addr = serve(&t).await;
    let admin = token(1, ROLE_ADMIN, None);

    let mut open = Vec::new();
    for _ in 0..5 {
        open.push(connect(addr, &admin).await);
    }

    let err = connect_async(format!("ws://{addr}/api/v1/ws?token={admin}"))
        .await
        .expect_err("sixth upgrade should be refused");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 429),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }

    // The window resets on the limiter's clock.
    t.clock.advance(chrono::Duration::seconds(61));
    open.push(connect(addr, &admin).await);
}
