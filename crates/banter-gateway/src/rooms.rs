//! Room membership side-tables.
//!
//! A connection belongs to at most one room at a time: joining a room
//! implicitly leaves the previous one. Membership is connection-scoped,
//! in-memory, and determined solely by these tables — never persisted.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use banter_core::{ConnectionId, RoomId};

#[derive(Default)]
struct Tables {
    /// room → member connections.
    members: HashMap<RoomId, HashSet<ConnectionId>>,
    /// connection → its single room.
    current: HashMap<ConnectionId, RoomId>,
}

/// Connection ↔ room membership index.
#[derive(Default)]
pub struct RoomDirectory {
    tables: Mutex<Tables>,
}

impl RoomDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `conn` to `room`.
    ///
    /// Returns the previously joined room when this join implicitly left
    /// one. Joining the room the connection is already in is a no-op and
    /// returns `None`.
    pub fn join(&self, conn: &ConnectionId, room: &RoomId) -> Option<RoomId> {
        let mut tables = self.tables.lock();
        if tables.current.get(conn) == Some(room) {
            return None;
        }
        let previous = Self::remove_membership(&mut tables, conn);
        let _ = tables
            .members
            .entry(room.clone())
            .or_default()
            .insert(conn.clone());
        let _ = tables.current.insert(conn.clone(), room.clone());
        previous
    }

    /// Remove `conn` from its room, if any. Returns the room left.
    pub fn leave(&self, conn: &ConnectionId) -> Option<RoomId> {
        let mut tables = self.tables.lock();
        Self::remove_membership(&mut tables, conn)
    }

    /// The room `conn` is currently in.
    #[must_use]
    pub fn room_of(&self, conn: &ConnectionId) -> Option<RoomId> {
        self.tables.lock().current.get(conn).cloned()
    }

    /// Member connections of a room.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.tables
            .lock()
            .members
            .get(room)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of member connections in a room.
    #[must_use]
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.tables.lock().members.get(room).map_or(0, HashSet::len)
    }

    fn remove_membership(tables: &mut Tables, conn: &ConnectionId) -> Option<RoomId> {
        let room = tables.current.remove(conn)?;
        if let Some(set) = tables.members.get_mut(&room) {
            let _ = set.remove(conn);
            if set.is_empty() {
                let _ = tables.members.remove(&room);
            }
        }
        Some(room)
    }
}
