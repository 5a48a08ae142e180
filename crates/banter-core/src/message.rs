//! Domain types for identities, rooms, and chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId, UserId};

/// Authenticated principal as reported by the token-verification
/// collaborator. Immutable for the lifetime of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque user ID.
    pub id: UserId,
    /// Display name shown to other room members.
    pub display_name: String,
    /// Email address.
    pub email: String,
}

/// Message author role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human participant.
    User,
    /// The retrieval-augmented assistant.
    Assistant,
    /// Instruction messages; excluded from similarity retrieval.
    System,
}

impl Role {
    /// Stable wire/storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse from the storage string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A named broadcast scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room ID.
    pub id: RoomId,
    /// Human-readable name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A chat message. Never mutated after creation except for asynchronous
/// embedding attachment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author identity; absent for assistant and system messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserId>,
    /// Author role.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Embedding vector, attached asynchronously after persistence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChatMessage {
    /// Build a user message for the given room.
    #[must_use]
    pub fn from_user(room_id: RoomId, author: UserId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            author: Some(author),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            embedding: None,
        }
    }

    /// Build an assistant message (no author identity).
    #[must_use]
    pub fn from_assistant(room_id: RoomId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            author: None,
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            embedding: None,
        }
    }
}
