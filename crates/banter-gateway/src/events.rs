//! Wire-level event protocol.
//!
//! Both directions use one envelope: `{"event": "...", "data": {...}}`.
//! Client events are `join`, `leave`, `send`, `typing`, `getRooms`; every
//! dispatch returns an acknowledgement envelope and may broadcast
//! further envelopes to other room members.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use banter_core::{ChatMessage, GatewayError, Identity, RoomId};

/// Incoming client event envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientEvent {
    /// Event name.
    pub event: String,
    /// Event payload; defaults to `null` when absent.
    #[serde(default)]
    pub data: Value,
}

/// `join` / `leave` payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    /// Target room.
    pub room_id: RoomId,
}

/// `send` payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    /// Target room.
    pub room_id: RoomId,
    /// Message text.
    pub text: String,
}

/// `typing` payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    /// Target room.
    pub room_id: RoomId,
    /// Whether the user started or stopped typing.
    pub is_typing: bool,
}

/// Outgoing envelope (acknowledgement or broadcast).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
}

impl ServerEvent {
    /// Build an envelope.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The `connected` greeting sent after admission.
    #[must_use]
    pub fn connected(connection_id: &str, identity: &Identity) -> Self {
        Self::new(
            "connected",
            json!({
                "connectionId": connection_id,
                "userId": identity.id,
                "displayName": identity.display_name,
            }),
        )
    }

    /// An error envelope carrying the stable code and the user-facing
    /// message — never internal detail.
    #[must_use]
    pub fn error(err: &GatewayError) -> Self {
        Self::new(
            "error",
            json!({
                "code": err.code(),
                "message": err.user_message(),
            }),
        )
    }

    /// A `message` broadcast for a persisted chat message.
    #[must_use]
    pub fn message(message: &ChatMessage) -> Self {
        Self::new(
            "message",
            serde_json::to_value(message).unwrap_or(Value::Null),
        )
    }

    /// Serialize once for fan-out to many connections.
    #[must_use]
    pub fn to_shared_json(&self) -> Arc<String> {
        Arc::new(serde_json::to_string(self).unwrap_or_default())
    }
}
