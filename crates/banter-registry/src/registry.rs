//! Identity ↔ connection registry with admission control.
//!
//! Invariant: every connection ID in the inverse map appears in exactly
//! one identity's forward set, and vice versa. An identity absent from
//! the forward map is offline. Both maps are guarded by one mutex — the
//! single serialization point that makes the cap check and insert atomic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use tracing::{debug, warn};

use banter_core::{ConnectionId, UserId};

use crate::connection::{ClientConnection, ConnectionMeta};

struct ConnectionEntry {
    user: UserId,
    handle: Arc<ClientConnection>,
    meta: ConnectionMeta,
}

#[derive(Default)]
struct RegistryState {
    /// identity → its live connection IDs.
    forward: HashMap<UserId, HashSet<ConnectionId>>,
    /// connection ID → owning identity and handle.
    inverse: HashMap<ConnectionId, ConnectionEntry>,
}

/// Per-identity multi-socket connection registry.
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    max_per_user: usize,
}

impl ConnectionRegistry {
    /// Create a registry with the given per-identity connection cap.
    #[must_use]
    pub fn new(max_per_user: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_per_user,
        }
    }

    /// The configured per-identity cap.
    #[must_use]
    pub fn max_per_user(&self) -> usize {
        self.max_per_user
    }

    /// Register a connection under an identity.
    ///
    /// Returns `false` without mutating state when the identity already
    /// holds the maximum number of connections. The check and the insert
    /// run under one lock, so concurrent admits cannot exceed the cap.
    pub fn admit(
        &self,
        user: &UserId,
        handle: Arc<ClientConnection>,
        meta: ConnectionMeta,
    ) -> bool {
        let mut state = self.state.lock();
        let connections = state.forward.entry(user.clone()).or_default();
        if connections.len() >= self.max_per_user {
            // Remove the entry we may have just created for an offline user.
            if connections.is_empty() {
                let _ = state.forward.remove(user);
            }
            warn!(user = %user, cap = self.max_per_user, "admission rejected: connection cap");
            return false;
        }

        let conn_id = handle.id.clone();
        let _ = connections.insert(conn_id.clone());
        let _ = state.inverse.insert(
            conn_id.clone(),
            ConnectionEntry {
                user: user.clone(),
                handle,
                meta,
            },
        );
        gauge!("registry_connections_active").increment(1.0);
        debug!(user = %user, conn = %conn_id, "connection admitted");
        true
    }

    /// Deregister a connection.
    ///
    /// Returns the identity when its **last** connection was removed —
    /// the "went offline" signal. Returns `None` for unknown connections
    /// and for removals that leave the identity online.
    pub fn remove(&self, conn: &ConnectionId) -> Option<UserId> {
        let mut state = self.state.lock();
        let entry = state.inverse.remove(conn)?;
        gauge!("registry_connections_active").decrement(1.0);

        let went_offline = match state.forward.get_mut(&entry.user) {
            Some(connections) => {
                let _ = connections.remove(conn);
                connections.is_empty()
            }
            None => false,
        };
        if went_offline {
            let _ = state.forward.remove(&entry.user);
            debug!(user = %entry.user, "identity went offline");
            return Some(entry.user);
        }
        None
    }

    /// Connection IDs currently registered for an identity.
    #[must_use]
    pub fn connections(&self, user: &UserId) -> HashSet<ConnectionId> {
        self.state
            .lock()
            .forward
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the identity has at least one live connection.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.state.lock().forward.contains_key(user)
    }

    /// Number of live connections for an identity.
    #[must_use]
    pub fn count(&self, user: &UserId) -> usize {
        self.state.lock().forward.get(user).map_or(0, HashSet::len)
    }

    /// Admission slots left for an identity.
    #[must_use]
    pub fn remaining(&self, user: &UserId) -> usize {
        self.max_per_user.saturating_sub(self.count(user))
    }

    /// Look up a connection's send handle.
    #[must_use]
    pub fn handle(&self, conn: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.state.lock().inverse.get(conn).map(|e| e.handle.clone())
    }

    /// The identity a connection is registered under.
    #[must_use]
    pub fn owner(&self, conn: &ConnectionId) -> Option<UserId> {
        self.state.lock().inverse.get(conn).map(|e| e.user.clone())
    }

    /// Metadata captured when the connection was admitted.
    #[must_use]
    pub fn meta(&self, conn: &ConnectionId) -> Option<ConnectionMeta> {
        self.state.lock().inverse.get(conn).map(|e| e.meta.clone())
    }

    /// Deliver an event to every connection of an identity.
    ///
    /// Best-effort: a full or closed channel on one device never aborts
    /// delivery to the rest. Returns the number of successful sends.
    pub fn send_to_all(&self, user: &UserId, payload: &Arc<String>) -> usize {
        self.fan_out(user, None, payload)
    }

    /// Like [`send_to_all`](Self::send_to_all) but skipping one connection
    /// (typically the originator).
    pub fn send_to_all_except(
        &self,
        user: &UserId,
        exclude: &ConnectionId,
        payload: &Arc<String>,
    ) -> usize {
        self.fan_out(user, Some(exclude), payload)
    }

    fn fan_out(
        &self,
        user: &UserId,
        exclude: Option<&ConnectionId>,
        payload: &Arc<String>,
    ) -> usize {
        let handles: Vec<Arc<ClientConnection>> = {
            let state = self.state.lock();
            let Some(connections) = state.forward.get(user) else {
                return 0;
            };
            connections
                .iter()
                .filter(|id| exclude.is_none_or(|ex| ex != *id))
                .filter_map(|id| state.inverse.get(id).map(|e| e.handle.clone()))
                .collect()
        };

        let mut delivered = 0;
        for handle in handles {
            if handle.send(Arc::clone(payload)) {
                delivered += 1;
            } else {
                warn!(user = %user, conn = %handle.id, "device fan-out drop (channel full or closed)");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_handle(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientConnection::new(id.into(), tx)), rx)
    }

    fn meta() -> ConnectionMeta {
        ConnectionMeta::new("test")
    }

    fn user(name: &str) -> UserId {
        UserId::from(name)
    }

    #[test]
    fn admit_registers_connection() {
        let registry = ConnectionRegistry::new(5);
        let (handle, _rx) = make_handle("c1");
        assert!(registry.admit(&user("u1"), handle, meta()));
        assert!(registry.is_online(&user("u1")));
        assert_eq!(registry.count(&user("u1")), 1);
        assert_eq!(registry.remaining(&user("u1")), 4);
    }

    #[test]
    fn admit_rejects_over_cap_without_side_effects() {
        let registry = ConnectionRegistry::new(2);
        let u = user("u1");
        let (h1, _r1) = make_handle("c1");
        let (h2, _r2) = make_handle("c2");
        let (h3, _r3) = make_handle("c3");

        assert!(registry.admit(&u, h1, meta()));
        assert!(registry.admit(&u, h2, meta()));
        assert!(!registry.admit(&u, h3, meta()));

        // Exactly the cap remains registered; the rejected one left no trace.
        assert_eq!(registry.count(&u), 2);
        assert!(registry.handle(&ConnectionId::from("c3")).is_none());
    }

    #[test]
    fn rejected_admit_for_offline_user_leaves_them_offline() {
        let registry = ConnectionRegistry::new(0);
        let (handle, _rx) = make_handle("c1");
        assert!(!registry.admit(&user("u1"), handle, meta()));
        assert!(!registry.is_online(&user("u1")));
    }

    #[test]
    fn remove_last_connection_signals_offline() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");
        let (handle, _rx) = make_handle("c1");
        assert!(registry.admit(&u, handle, meta()));

        let offline = registry.remove(&ConnectionId::from("c1"));
        assert_eq!(offline, Some(u.clone()));
        assert!(!registry.is_online(&u));
        assert_eq!(registry.count(&u), 0);
    }

    #[test]
    fn remove_non_last_connection_returns_none() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");
        let (h1, _r1) = make_handle("c1");
        let (h2, _r2) = make_handle("c2");
        assert!(registry.admit(&u, h1, meta()));
        assert!(registry.admit(&u, h2, meta()));

        let offline = registry.remove(&ConnectionId::from("c1"));
        assert_eq!(offline, None);
        assert!(registry.is_online(&u));
        assert_eq!(registry.count(&u), 1);
    }

    #[test]
    fn remove_unknown_connection_is_none() {
        let registry = ConnectionRegistry::new(5);
        assert_eq!(registry.remove(&ConnectionId::from("ghost")), None);
    }

    #[test]
    fn freed_slot_allows_new_admission() {
        let registry = ConnectionRegistry::new(1);
        let u = user("u1");
        let (h1, _r1) = make_handle("c1");
        let (h2, _r2) = make_handle("c2");

        assert!(registry.admit(&u, h1, meta()));
        assert!(!registry.admit(&u, h2.clone(), meta()));
        let _ = registry.remove(&ConnectionId::from("c1"));
        assert!(registry.admit(&u, h2, meta()));
    }

    #[test]
    fn connections_lists_ids() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");
        let (h1, _r1) = make_handle("c1");
        let (h2, _r2) = make_handle("c2");
        assert!(registry.admit(&u, h1, meta()));
        assert!(registry.admit(&u, h2, meta()));

        let ids = registry.connections(&u);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&ConnectionId::from("c1")));
        assert!(ids.contains(&ConnectionId::from("c2")));
    }

    #[test]
    fn connections_of_offline_user_is_empty() {
        let registry = ConnectionRegistry::new(5);
        assert!(registry.connections(&user("nobody")).is_empty());
        assert_eq!(registry.remaining(&user("nobody")), 5);
    }

    #[test]
    fn owner_maps_connection_to_identity() {
        let registry = ConnectionRegistry::new(5);
        let (handle, _rx) = make_handle("c1");
        assert!(registry.admit(&user("u1"), handle, meta()));
        assert_eq!(registry.owner(&ConnectionId::from("c1")), Some(user("u1")));
        assert_eq!(registry.owner(&ConnectionId::from("c9")), None);
    }

    #[tokio::test]
    async fn send_to_all_reaches_every_device() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");
        let (h1, mut r1) = make_handle("c1");
        let (h2, mut r2) = make_handle("c2");
        assert!(registry.admit(&u, h1, meta()));
        assert!(registry.admit(&u, h2, meta()));

        let delivered = registry.send_to_all(&u, &Arc::new("ev".to_string()));
        assert_eq!(delivered, 2);
        assert!(r1.try_recv().is_ok());
        assert!(r2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_all_except_skips_originator() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");
        let (h1, mut r1) = make_handle("c1");
        let (h2, mut r2) = make_handle("c2");
        assert!(registry.admit(&u, h1, meta()));
        assert!(registry.admit(&u, h2, meta()));

        let delivered =
            registry.send_to_all_except(&u, &ConnectionId::from("c1"), &Arc::new("ev".to_string()));
        assert_eq!(delivered, 1);
        assert!(r1.try_recv().is_err());
        assert!(r2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dead_socket_does_not_abort_fan_out() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");

        // A connection whose receiver is gone
        let (tx, rx) = mpsc::channel(32);
        let dead = Arc::new(ClientConnection::new("dead".into(), tx));
        drop(rx);
        let (live, mut live_rx) = make_handle("live");

        assert!(registry.admit(&u, dead, meta()));
        assert!(registry.admit(&u, live, meta()));

        let delivered = registry.send_to_all(&u, &Arc::new("ev".to_string()));
        assert_eq!(delivered, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_offline_user_delivers_nothing() {
        let registry = ConnectionRegistry::new(5);
        assert_eq!(registry.send_to_all(&user("ghost"), &Arc::new("ev".to_string())), 0);
    }

    #[test]
    fn concurrent_admits_never_exceed_cap() {
        let registry = Arc::new(ConnectionRegistry::new(5));
        let u = user("u1");
        let mut threads = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            let u = u.clone();
            threads.push(std::thread::spawn(move || {
                let (tx, _rx) = mpsc::channel(1);
                let handle = Arc::new(ClientConnection::new(format!("c{i}").into(), tx));
                registry.admit(&u, handle, ConnectionMeta::new("race"))
            }));
        }
        let admitted = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
        assert_eq!(registry.count(&u), 5);
    }

    #[test]
    fn forward_and_inverse_maps_stay_mirrored() {
        let registry = ConnectionRegistry::new(5);
        let u = user("u1");
        let (h1, _r1) = make_handle("c1");
        let (h2, _r2) = make_handle("c2");
        assert!(registry.admit(&u, h1, meta()));
        assert!(registry.admit(&u, h2, meta()));
        let _ = registry.remove(&ConnectionId::from("c1"));

        // Inverse lookup for removed conn is gone, remaining conn intact
        assert!(registry.handle(&ConnectionId::from("c1")).is_none());
        assert!(registry.handle(&ConnectionId::from("c2")).is_some());
        assert_eq!(registry.connections(&u).len(), 1);
    }
}
