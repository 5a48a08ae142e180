//! # banter-limiter
//!
//! Fixed-window rate limiting backed by the shared counter store.
//!
//! One parameterized limiter configured with a quota table replaces the
//! per-event-kind guard hierarchy of older designs. Counters are
//! incremented atomically by the store (increment-then-read), so multiple
//! gateway processes share windows correctly. The window is "leaky": a
//! denied action still counts toward the window.
//!
//! On store unavailability the limiter **fails open** — chat availability
//! is prioritized over strict enforcement.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use banter_core::UserId;
use banter_store::SharedStore;

/// Rate-limited event kinds. Each kind has its own independent window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Plain message sends.
    Message,
    /// Messages over the configured length threshold; checked in
    /// addition to [`EventKind::Message`].
    LongMessage,
    /// Typing indicators.
    Typing,
    /// Room joins and leaves.
    RoomChange,
}

impl EventKind {
    /// Stable counter-key segment.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::LongMessage => "long_message",
            Self::Typing => "typing",
            Self::RoomChange => "room_change",
        }
    }
}

/// A fixed-window quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Allowed actions per window.
    pub limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Quota {
    /// Construct a quota.
    #[must_use]
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    fn window(self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-event-kind quota table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTable(HashMap<EventKind, Quota>);

impl Default for QuotaTable {
    fn default() -> Self {
        Self(HashMap::from([
            (EventKind::Message, Quota::new(10, 60)),
            (EventKind::LongMessage, Quota::new(2, 300)),
            (EventKind::Typing, Quota::new(20, 60)),
            (EventKind::RoomChange, Quota::new(5, 60)),
        ]))
    }
}

impl QuotaTable {
    /// Look up the quota for a kind. Kinds without a configured quota
    /// are unlimited.
    #[must_use]
    pub fn quota(&self, kind: EventKind) -> Option<Quota> {
        self.0.get(&kind).copied()
    }

    /// Override the quota for a kind.
    #[must_use]
    pub fn with_quota(mut self, kind: EventKind, quota: Quota) -> Self {
        let _ = self.0.insert(kind, quota);
        self
    }
}

/// Fixed-window rate limiter over a [`SharedStore`].
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    quotas: QuotaTable,
}

impl RateLimiter {
    /// Create a limiter with the given store and quota table.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, quotas: QuotaTable) -> Self {
        Self { store, quotas }
    }

    /// Check whether `user` may perform an action of `kind` right now.
    ///
    /// Increments the window counter first, then compares: a denied
    /// action still consumed a slot. Store failures allow the action.
    pub async fn allow(&self, user: &UserId, kind: EventKind) -> bool {
        let Some(quota) = self.quotas.quota(kind) else {
            return true;
        };

        let key = format!("rl:{}:{}", user.as_str(), kind.as_str());
        match self.store.incr_with_ttl(&key, quota.window()).await {
            Ok(count) => {
                let allowed = count <= i64::from(quota.limit);
                if !allowed {
                    counter!("rate_limit_denials_total", "kind" => kind.as_str()).increment(1);
                }
                allowed
            }
            Err(e) => {
                // Fail open: availability over strict enforcement.
                warn!(user = %user, kind = kind.as_str(), error = %e, "rate-limit store unavailable, allowing");
                counter!("rate_limit_store_errors_total").increment(1);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_store::{FlakySharedStore, MemorySharedStore};

    fn limiter_with(quotas: QuotaTable) -> RateLimiter {
        RateLimiter::new(Arc::new(MemorySharedStore::new()), quotas)
    }

    fn user(name: &str) -> UserId {
        UserId::from(name)
    }

    #[test]
    fn default_table_matches_configured_quotas() {
        let table = QuotaTable::default();
        assert_eq!(table.quota(EventKind::Message), Some(Quota::new(10, 60)));
        assert_eq!(table.quota(EventKind::Typing), Some(Quota::new(20, 60)));
        assert_eq!(table.quota(EventKind::RoomChange), Some(Quota::new(5, 60)));
        assert_eq!(table.quota(EventKind::LongMessage), Some(Quota::new(2, 300)));
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = limiter_with(
            QuotaTable::default().with_quota(EventKind::Message, Quota::new(3, 10)),
        );
        let u = user("u1");

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(limiter.allow(&u, EventKind::Message).await);
        }
        assert_eq!(results, vec![true, true, true, false]);
    }

    #[tokio::test]
    async fn window_expiry_resets_the_counter() {
        // 1-second window is the smallest the store's second-granularity
        // TTL supports.
        let limiter = limiter_with(
            QuotaTable::default().with_quota(EventKind::Message, Quota::new(1, 1)),
        );
        let u = user("u1");

        assert!(limiter.allow(&u, EventKind::Message).await);
        assert!(!limiter.allow(&u, EventKind::Message).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow(&u, EventKind::Message).await);
    }

    #[tokio::test]
    async fn denied_actions_still_consume_the_window() {
        let limiter = limiter_with(
            QuotaTable::default().with_quota(EventKind::Message, Quota::new(2, 60)),
        );
        let u = user("u1");

        assert!(limiter.allow(&u, EventKind::Message).await);
        assert!(limiter.allow(&u, EventKind::Message).await);
        // Leaky window: each denied attempt increments too, so the user
        // stays denied no matter how often they retry within the window.
        for _ in 0..5 {
            assert!(!limiter.allow(&u, EventKind::Message).await);
        }
    }

    #[tokio::test]
    async fn kinds_are_tracked_independently() {
        let limiter = limiter_with(
            QuotaTable::default()
                .with_quota(EventKind::Message, Quota::new(1, 60))
                .with_quota(EventKind::Typing, Quota::new(1, 60)),
        );
        let u = user("u1");

        assert!(limiter.allow(&u, EventKind::Message).await);
        assert!(!limiter.allow(&u, EventKind::Message).await);
        // Typing has its own window
        assert!(limiter.allow(&u, EventKind::Typing).await);
    }

    #[tokio::test]
    async fn users_are_tracked_independently() {
        let limiter = limiter_with(
            QuotaTable::default().with_quota(EventKind::Message, Quota::new(1, 60)),
        );

        assert!(limiter.allow(&user("a"), EventKind::Message).await);
        assert!(!limiter.allow(&user("a"), EventKind::Message).await);
        assert!(limiter.allow(&user("b"), EventKind::Message).await);
    }

    #[tokio::test]
    async fn one_action_may_consume_from_two_kinds() {
        let store = Arc::new(MemorySharedStore::new());
        let limiter = RateLimiter::new(
            store,
            QuotaTable::default()
                .with_quota(EventKind::Message, Quota::new(10, 60))
                .with_quota(EventKind::LongMessage, Quota::new(1, 60)),
        );
        let u = user("u1");

        // A long message is checked against both kinds: generic first.
        assert!(limiter.allow(&u, EventKind::Message).await);
        assert!(limiter.allow(&u, EventKind::LongMessage).await);

        // Second long message: generic still fine, long quota spent.
        assert!(limiter.allow(&u, EventKind::Message).await);
        assert!(!limiter.allow(&u, EventKind::LongMessage).await);
    }

    #[tokio::test]
    async fn fails_open_when_store_is_down() {
        let store = Arc::new(FlakySharedStore::new());
        store.set_failing(true);
        let limiter = RateLimiter::new(
            store.clone(),
            QuotaTable::default().with_quota(EventKind::Message, Quota::new(1, 60)),
        );
        let u = user("u1");

        // Far past the limit, everything is allowed while the store is down.
        for _ in 0..10 {
            assert!(limiter.allow(&u, EventKind::Message).await);
        }

        // Enforcement resumes once the store recovers.
        store.set_failing(false);
        assert!(limiter.allow(&u, EventKind::Message).await);
        assert!(!limiter.allow(&u, EventKind::Message).await);
    }

    #[tokio::test]
    async fn unconfigured_kind_is_unlimited() {
        let mut table = QuotaTable::default();
        table = QuotaTable(
            table
                .0
                .drain()
                .filter(|(k, _)| *k != EventKind::Typing)
                .collect(),
        );
        let limiter = limiter_with(table);
        let u = user("u1");
        for _ in 0..100 {
            assert!(limiter.allow(&u, EventKind::Typing).await);
        }
    }

    #[test]
    fn kind_keys_are_distinct() {
        let kinds = [
            EventKind::Message,
            EventKind::LongMessage,
            EventKind::Typing,
            EventKind::RoomChange,
        ];
        let keys: std::collections::HashSet<&str> =
            kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), kinds.len());
    }
}
