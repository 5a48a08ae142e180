//! Record store collaborator — rooms and messages.
//!
//! The trait is what the gateway and the retrieval pipeline program
//! against; [`SqliteRecordStore`] is the reference implementation.
//! Similarity search is brute-force cosine ranking over BLOB embeddings,
//! scoped to a room, excluding `system` messages and rows without an
//! embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use banter_core::{ChatMessage, MessageId, Role, Room, RoomId};

use crate::blob::{blob_to_f32_vec, f32_slice_to_blob};
use crate::connection::ConnectionPool;
use crate::errors::{Result, StoreError};
use crate::vector::cosine_similarity;

/// Keyed CRUD over rooms and messages, with room-scoped time-ordered
/// queries and vector-similarity search.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the room if it does not exist yet (rooms are created on
    /// first message).
    async fn ensure_room(&self, room: &RoomId, name: &str) -> Result<()>;

    /// All known rooms, oldest first.
    async fn list_rooms(&self) -> Result<Vec<Room>>;

    /// Persist a message.
    async fn insert_message(&self, message: &ChatMessage) -> Result<()>;

    /// The room's most recent `limit` messages in chronological order.
    async fn recent_messages(&self, room: &RoomId, limit: usize) -> Result<Vec<ChatMessage>>;

    /// The `k` stored messages nearest to `query` by cosine similarity,
    /// descending. Only rows with an embedding; `system` messages are
    /// excluded.
    async fn similar_messages(
        &self,
        room: &RoomId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(ChatMessage, f32)>>;

    /// Attach an embedding to an already-persisted message.
    async fn attach_embedding(&self, message: &MessageId, embedding: &[f32]) -> Result<()>;

    /// Messages in the room that still lack an embedding, oldest first.
    async fn messages_missing_embedding(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>>;
}

/// `SQLite`-backed record store.
pub struct SqliteRecordStore {
    pool: ConnectionPool,
}

impl SqliteRecordStore {
    /// Create a store over an already-migrated pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<(ChatMessage, String)> {
    let id: String = row.get(0)?;
    let room_id: String = row.get(1)?;
    let author: Option<String> = row.get(2)?;
    let role: String = row.get(3)?;
    let content: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let embedding: Option<Vec<u8>> = row.get(6)?;

    let message = ChatMessage {
        id: id.into(),
        room_id: room_id.into(),
        author: author.map(Into::into),
        role: Role::parse(&role).unwrap_or(Role::User),
        content,
        created_at: Utc::now(), // replaced after timestamp parsing
        embedding: embedding.map(|b| blob_to_f32_vec(&b)),
    };
    Ok((message, created_at))
}

const MESSAGE_COLUMNS: &str = "id, room_id, author_id, role, content, created_at, embedding";

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn ensure_room(&self, room: &RoomId, name: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO rooms (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![room.as_str(), name, Utc::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            debug!(room = %room, "room created");
        }
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM rooms ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut rooms = Vec::new();
        for row in rows {
            let (id, name, created_at) = row?;
            rooms.push(Room {
                id: id.into(),
                name,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(rooms)
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        let conn = self.pool.get()?;
        let blob = message.embedding.as_deref().map(f32_slice_to_blob);
        let _ = conn.execute(
            "INSERT INTO messages (id, room_id, author_id, role, content, created_at, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.as_str(),
                message.room_id.as_str(),
                message.author.as_ref().map(banter_core::UserId::as_str),
                message.role.as_str(),
                message.content,
                message.created_at.to_rfc3339(),
                blob,
            ],
        )?;
        Ok(())
    }

    async fn recent_messages(&self, room: &RoomId, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![room.as_str(), limit as i64], message_from_row)?;

        let mut messages = Vec::new();
        for row in rows {
            let (mut message, created_at) = row?;
            message.created_at = parse_timestamp(&created_at)?;
            messages.push(message);
        }
        // Query was newest-first; callers want chronological order.
        messages.reverse();
        Ok(messages)
    }

    async fn similar_messages(
        &self,
        room: &RoomId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(ChatMessage, f32)>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ?1 AND embedding IS NOT NULL AND role != 'system'"
        ))?;
        let rows = stmt.query_map(params![room.as_str()], message_from_row)?;

        let mut scored = Vec::new();
        for row in rows {
            let (mut message, created_at) = row?;
            message.created_at = parse_timestamp(&created_at)?;
            let similarity = message
                .embedding
                .as_deref()
                .map_or(0.0, |e| cosine_similarity(query, e));
            scored.push((message, similarity));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn attach_embedding(&self, message: &MessageId, embedding: &[f32]) -> Result<()> {
        let conn = self.pool.get()?;
        let blob = f32_slice_to_blob(embedding);
        let updated = conn.execute(
            "UPDATE messages SET embedding = ?1 WHERE id = ?2",
            params![blob, message.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::Corrupt(format!("no message with id {message}")));
        }
        Ok(())
    }

    async fn messages_missing_embedding(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ?1 AND embedding IS NULL AND role != 'system'
             ORDER BY created_at LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![room.as_str(), limit as i64], message_from_row)?;

        let mut messages = Vec::new();
        for row in rows {
            let (mut message, created_at) = row?;
            message.created_at = parse_timestamp(&created_at)?;
            messages.push(message);
        }
        Ok(messages)
    }
}

impl SqliteRecordStore {
    /// Fetch a single message by ID (tests and diagnostics).
    pub fn message(&self, id: &MessageId) -> Result<Option<ChatMessage>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.as_str()],
                message_from_row,
            )
            .optional()?;
        match row {
            Some((mut message, created_at)) => {
                message.created_at = parse_timestamp(&created_at)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}
