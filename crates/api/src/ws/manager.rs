use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::ws::Message;
use fieldops_core::clock::{Clock, SystemClock};
use fieldops_core::roles::ROLE_CUSTOMER;
use fieldops_core::types::{DbId, Timestamp};
use fieldops_events::{HubEvent, Target};
use tokio::sync::mpsc;

use crate::ws::protocol::ServerMessage;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Who a connection authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnIdentity {
    pub user_id: DbId,
    pub role: String,
    pub customer_id: Option<DbId>,
}

/// Why a `join-room` request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Unknown connection")]
    UnknownConnection,

    #[error("Customers may only join their own customer room")]
    ForeignCustomerRoom,
}

/// Metadata for a single registered connection.
pub struct WsConnection {
    pub identity: ConnIdentity,
    pub addr: IpAddr,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
    pub last_heartbeat: Timestamp,
    pub rooms: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<String, WsConnection>,
    rooms: HashMap<String, HashSet<String>>,
}

impl Registry {
    fn leave_all(&mut self, conn_id: &str, rooms: &HashSet<String>) {
        for room in rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(conn_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
    }
}

/// Registry of live connections and their room memberships.
///
/// Uses a std `RwLock` that is never held across `.await`, so
/// [`publish`](Self::publish) is synchronous and callable from anywhere.
/// Designed to be wrapped in `Arc` and shared across the application.
pub struct WsManager {
    clock: Arc<dyn Clock>,
    registry: RwLock<Registry>,
}

impl WsManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            registry: RwLock::new(Registry::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an authenticated connection. It joins no rooms until it asks.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub fn add(
        &self,
        conn_id: String,
        identity: ConnIdentity,
        addr: IpAddr,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = self.clock.now();
        let conn = WsConnection {
            identity,
            addr,
            sender: tx,
            connected_at: now,
            last_heartbeat: now,
            rooms: HashSet::new(),
        };
        self.write().connections.insert(conn_id, conn);
        rx
    }

    /// Remove a connection and release its rooms. Returns whether it existed.
    pub fn remove(&self, conn_id: &str) -> bool {
        let mut registry = self.write();
        match registry.connections.remove(conn_id) {
            Some(conn) => {
                registry.leave_all(conn_id, &conn.rooms);
                true
            }
            None => false,
        }
    }

    /// Join the connection's identity and role rooms, plus a customer room.
    ///
    /// Customers may only name their own customer id; when they name none,
    /// their own customer room is joined. Other roles may join any customer
    /// room. Returns every room the connection is now in, sorted.
    pub fn join_rooms(
        &self,
        conn_id: &str,
        customer_id: Option<DbId>,
    ) -> Result<Vec<String>, JoinError> {
        let mut registry = self.write();
        let conn = registry
            .connections
            .get_mut(conn_id)
            .ok_or(JoinError::UnknownConnection)?;

        let identity = &conn.identity;
        let customer_room = if identity.role == ROLE_CUSTOMER {
            match (customer_id, identity.customer_id) {
                (Some(requested), Some(own)) if requested == own => Some(own),
                (None, own) => own,
                _ => return Err(JoinError::ForeignCustomerRoom),
            }
        } else {
            customer_id
        };

        let mut wanted = vec![
            Target::User(identity.user_id),
            Target::Role(identity.role.clone()),
        ];
        if let Some(id) = customer_room {
            wanted.push(Target::Customer(id));
        }
        let wanted: Vec<String> = wanted.iter().filter_map(Target::room).collect();

        conn.rooms.extend(wanted.iter().cloned());
        let mut joined: Vec<String> = conn.rooms.iter().cloned().collect();
        joined.sort();

        for room in wanted {
            registry
                .rooms
                .entry(room)
                .or_default()
                .insert(conn_id.to_string());
        }
        Ok(joined)
    }

    /// Record a heartbeat. Returns the recorded time, or `None` for an
    /// unknown connection.
    pub fn touch_heartbeat(&self, conn_id: &str) -> Option<Timestamp> {
        let now = self.clock.now();
        let mut registry = self.write();
        let conn = registry.connections.get_mut(conn_id)?;
        conn.last_heartbeat = now;
        Some(now)
    }

    /// Deliver `event` to every connection `target` resolves to.
    ///
    /// Fire-and-forget: connections whose channels are closed are skipped.
    /// Returns the number of connections the event was handed to.
    pub fn publish(&self, target: &Target, event: &HubEvent) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(kind = event.kind(), error = %e, "Failed to serialize hub event");
                return 0;
            }
        };
        let message = Message::Text(text.into());

        let registry = self.read();
        let mut count = 0;
        match target.room() {
            None => {
                for conn in registry.connections.values() {
                    if conn.sender.send(message.clone()).is_ok() {
                        count += 1;
                    }
                }
            }
            Some(room) => {
                let Some(members) = registry.rooms.get(&room) else {
                    return 0;
                };
                for conn_id in members {
                    if let Some(conn) = registry.connections.get(conn_id) {
                        if conn.sender.send(message.clone()).is_ok() {
                            count += 1;
                        }
                    }
                }
            }
        }
        tracing::trace!(kind = event.kind(), ?target, count, "Hub event published");
        count
    }

    /// Send a control frame to one connection.
    pub fn send(&self, conn_id: &str, message: &ServerMessage) -> bool {
        let registry = self.read();
        match registry.connections.get(conn_id) {
            Some(conn) => conn
                .sender
                .send(Message::Text(message.to_json().into()))
                .is_ok(),
            None => false,
        }
    }

    /// Disconnect every connection whose last heartbeat is older than
    /// `timeout`. Each gets a Close frame and loses its rooms. Returns the
    /// reaped connection ids.
    pub fn reap_stale(&self, timeout: chrono::Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut registry = self.write();

        let stale: Vec<String> = registry
            .connections
            .iter()
            .filter(|(_, conn)| now - conn.last_heartbeat > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for conn_id in &stale {
            if let Some(conn) = registry.connections.remove(conn_id) {
                let _ = conn.sender.send(Message::Close(None));
                registry.leave_all(conn_id, &conn.rooms);
                tracing::info!(
                    conn_id = %conn_id,
                    user_id = conn.identity.user_id,
                    addr = %conn.addr,
                    "Reaped connection without heartbeat"
                );
            }
        }
        stale
    }

    /// Return the current number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }

    /// Number of connections in `room`.
    pub fn room_size(&self, room: &str) -> usize {
        self.read().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Rooms a connection has joined, sorted.
    pub fn rooms_of(&self, conn_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .read()
            .connections
            .get(conn_id)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Send a Close frame to every connection, then clear the registry.
    ///
    /// Used during graceful shutdown.
    pub fn shutdown_all(&self) {
        let mut registry = self.write();
        let count = registry.connections.len();
        for conn in registry.connections.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        registry.connections.clear();
        registry.rooms.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
