//! Wire protocol for hub connections.
//!
//! Every frame is a JSON text message shaped `{"type": ..., "data": ...}`.
//! Outbound events reuse [`HubEvent`](fieldops_events::HubEvent)'s
//! serialization; the control frames below cover the rest.

use chrono::{DateTime, Utc};
use fieldops_core::types::DbId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Join the caller's rooms, optionally including a customer room.
    JoinRoom { customer_id: Option<DbId> },
    /// Liveness signal; answered with `heartbeat-ack`.
    Heartbeat,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomData {
    customer_id: Option<DbId>,
}

/// Why an inbound frame was not understood.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid data for {kind}: {source}")]
    InvalidData {
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl ClientMessage {
    /// Parse a text frame. `data` may be omitted or `null` for every type.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        match frame.kind.as_str() {
            "join-room" => {
                let data = if frame.data.is_null() {
                    JoinRoomData::default()
                } else {
                    serde_json::from_value(frame.data).map_err(|source| {
                        ProtocolError::InvalidData {
                            kind: "join-room",
                            source,
                        }
                    })?
                };
                Ok(Self::JoinRoom {
                    customer_id: data.customer_id,
                })
            }
            "heartbeat" => Ok(Self::Heartbeat),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Control frames the server sends besides hub events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    HeartbeatAck { timestamp: DateTime<Utc> },
    Error { message: String },
    RoomJoined { rooms: Vec<String> },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: no maps with non-string keys.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":{"message":"serialization failed"}}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_room_with_and_without_customer() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join-room","data":{"customerId":12}}"#).unwrap(),
            ClientMessage::JoinRoom {
                customer_id: Some(12)
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join-room","data":{}}"#).unwrap(),
            ClientMessage::JoinRoom { customer_id: None }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join-room"}"#).unwrap(),
            ClientMessage::JoinRoom { customer_id: None }
        );
    }

    #[test]
    fn parses_heartbeat() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"heartbeat","data":{}}"#).unwrap(),
            ClientMessage::Heartbeat
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"heartbeat"}"#).unwrap(),
            ClientMessage::Heartbeat
        );
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"subscribe-all"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "subscribe-all"
        ));
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"join-room","data":{"customerId":"abc"}}"#),
            Err(ProtocolError::InvalidData { .. })
        ));
    }

    #[test]
    fn server_messages_are_kebab_tagged() {
        let json: Value =
            serde_json::from_str(&ServerMessage::error("Invalid token").to_json()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "Invalid token");

        let json: Value = serde_json::from_str(
            &ServerMessage::RoomJoined {
                rooms: vec!["user:1".to_string()],
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(json["type"], "room-joined");
        assert_eq!(json["data"]["rooms"][0], "user:1");
    }
}
