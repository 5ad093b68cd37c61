//! Unit tests for `WsManager`.
//!
//! These exercise the connection manager directly, without any HTTP
//! upgrade: room membership rules, targeted delivery, heartbeat reaping on a
//! manual clock, and shutdown.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::ws::Message;
use chrono::Duration;
use fieldops_core::clock::ManualClock;
use fieldops_core::roles::{ROLE_ADMIN, ROLE_CUSTOMER, ROLE_STAFF};
use fieldops_events::event::{Notice, NoticeLevel};
use fieldops_events::{HubEvent, Target};
use tokio::sync::mpsc::UnboundedReceiver;

use fieldops_api::ws::{ConnIdentity, JoinError, WsManager};

const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn identity(user_id: i64, role: &str, customer_id: Option<i64>) -> ConnIdentity {
    ConnIdentity {
        user_id,
        role: role.to_string(),
        customer_id,
    }
}

fn notice() -> HubEvent {
    HubEvent::SystemNotification(Notice {
        title: "Maintenance".into(),
        message: "Back in five".into(),
        level: NoticeLevel::Info,
    })
}

fn drain_text(rx: &mut UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Test: add/remove track the connection count
// ---------------------------------------------------------------------------

#[test]
fn add_and_remove_track_connection_count() {
    let manager = WsManager::default();
    assert_eq!(manager.connection_count(), 0);

    let _rx = manager.add("conn-1".into(), identity(1, ROLE_STAFF, None), ADDR);
    assert_eq!(manager.connection_count(), 1);

    assert!(!manager.remove("nonexistent"));
    assert!(manager.remove("conn-1"));
    assert_eq!(manager.connection_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: join-room puts a connection in its user, role and customer rooms
// ---------------------------------------------------------------------------

#[test]
fn join_adds_identity_role_and_customer_rooms() {
    let manager = WsManager::default();
    let _rx = manager.add("conn-1".into(), identity(4, ROLE_ADMIN, None), ADDR);

    let rooms = manager.join_rooms("conn-1", Some(12)).unwrap();

    assert_eq!(rooms, vec!["customer:12", "role:admin", "user:4"]);
    assert_eq!(manager.room_size("role:admin"), 1);
    assert_eq!(manager.rooms_of("conn-1"), rooms);
}

#[test]
fn customer_joins_own_room_by_default_and_cannot_join_others() {
    let manager = WsManager::default();
    let _rx = manager.add("conn-1".into(), identity(9, ROLE_CUSTOMER, Some(7)), ADDR);

    assert_matches!(
        manager.join_rooms("conn-1", Some(8)),
        Err(JoinError::ForeignCustomerRoom)
    );
    assert_eq!(manager.room_size("customer:8"), 0);

    let rooms = manager.join_rooms("conn-1", None).unwrap();
    assert!(rooms.contains(&"customer:7".to_string()));
}

#[test]
fn join_for_unknown_connection_fails() {
    let manager = WsManager::default();
    assert_matches!(
        manager.join_rooms("ghost", None),
        Err(JoinError::UnknownConnection)
    );
}

// ---------------------------------------------------------------------------
// Test: publish reaches exactly the target room
// ---------------------------------------------------------------------------

#[test]
fn publish_to_role_reaches_only_members() {
    let manager = WsManager::default();
    let mut admin_rx = manager.add("admin".into(), identity(1, ROLE_ADMIN, None), ADDR);
    let mut staff_rx = manager.add("staff".into(), identity(2, ROLE_STAFF, None), ADDR);
    manager.join_rooms("admin", None).unwrap();
    manager.join_rooms("staff", None).unwrap();

    let delivered = manager.publish(&Target::Role(ROLE_ADMIN.into()), &notice());

    assert_eq!(delivered, 1);
    let frames = drain_text(&mut admin_rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "system-notification");
    assert_eq!(frames[0]["data"]["title"], "Maintenance");
    assert!(drain_text(&mut staff_rx).is_empty());
}

#[test]
fn publish_to_all_reaches_connections_without_rooms() {
    let manager = WsManager::default();
    let mut rx1 = manager.add("c1".into(), identity(1, ROLE_STAFF, None), ADDR);
    let mut rx2 = manager.add("c2".into(), identity(2, ROLE_STAFF, None), ADDR);

    assert_eq!(manager.publish(&Target::All, &notice()), 2);
    assert_eq!(drain_text(&mut rx1).len(), 1);
    assert_eq!(drain_text(&mut rx2).len(), 1);
}

#[test]
fn publish_to_empty_room_delivers_nothing() {
    let manager = WsManager::default();
    let _rx = manager.add("c1".into(), identity(1, ROLE_STAFF, None), ADDR);

    assert_eq!(manager.publish(&Target::Customer(99), &notice()), 0);
}

#[test]
fn removed_connection_leaves_its_rooms() {
    let manager = WsManager::default();
    let _rx = manager.add("c1".into(), identity(1, ROLE_STAFF, None), ADDR);
    manager.join_rooms("c1", None).unwrap();
    assert_eq!(manager.room_size("role:staff"), 1);

    manager.remove("c1");

    assert_eq!(manager.room_size("role:staff"), 0);
    assert_eq!(manager.publish(&Target::Role(ROLE_STAFF.into()), &notice()), 0);
}

// ---------------------------------------------------------------------------
// Test: heartbeat reaping
// ---------------------------------------------------------------------------

#[test]
fn reap_drops_only_silent_connections() {
    let clock = Arc::new(ManualClock::default());
    let manager = WsManager::new(clock.clone());
    let mut quiet_rx = manager.add("quiet".into(), identity(1, ROLE_STAFF, None), ADDR);
    let _chatty_rx = manager.add("chatty".into(), identity(2, ROLE_STAFF, None), ADDR);
    manager.join_rooms("quiet", None).unwrap();

    clock.advance(Duration::seconds(20));
    assert!(manager.touch_heartbeat("chatty").is_some());
    clock.advance(Duration::seconds(15));

    let reaped = manager.reap_stale(Duration::seconds(30));

    assert_eq!(reaped, vec!["quiet".to_string()]);
    assert_eq!(manager.connection_count(), 1);
    assert_eq!(manager.room_size("role:staff"), 0);
    assert_matches!(quiet_rx.try_recv(), Ok(Message::Close(None)));
}

#[test]
fn heartbeat_for_unknown_connection_is_none() {
    let manager = WsManager::default();
    assert!(manager.touch_heartbeat("ghost").is_none());
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[test]
fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::default();
    let mut rx1 = manager.add("conn-1".into(), identity(1, ROLE_STAFF, None), ADDR);
    let mut rx2 = manager.add("conn-2".into(), identity(2, ROLE_ADMIN, None), ADDR);
    manager.join_rooms("conn-1", None).unwrap();

    manager.shutdown_all();

    assert_eq!(manager.connection_count(), 0);
    assert_eq!(manager.room_size("role:staff"), 0);
    assert_matches!(rx1.try_recv(), Ok(Message::Close(None)));
    assert_matches!(rx2.try_recv(), Ok(Message::Close(None)));
}
