//! Shared counter/cache store collaborator.
//!
//! Backs the rate limiter (atomic increment-with-expiry) and the
//! embedding cache (get/set-with-TTL). The store is treated as
//! unreliable: callers must fail open or degrade when it errors, so the
//! chat path never depends on its availability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{Result, StoreError};

/// Low-latency key-value/counter store.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment the counter at `key` and return the
    /// post-increment value. When the increment creates the key, `ttl`
    /// is applied; the counter disappears when it expires.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Fetch a value. Absent or expired keys return `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a time-to-live.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local [`SharedStore`] with lazy expiry.
#[derive(Default)]
pub struct MemorySharedStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySharedStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Option<&'a mut Entry> {
        let expired = entries
            .get(key)
            .is_some_and(|e| e.expires_at <= Instant::now());
        if expired {
            let _ = entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl SharedStore for MemorySharedStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock();
        if let Some(entry) = Self::live_entry(&mut entries, key) {
            let current: i64 = entry
                .value
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("non-numeric counter at {key}")))?;
            let next = current + 1;
            entry.value = next.to_string();
            return Ok(next);
        }
        let _ = entries.insert(
            key.to_owned(),
            Entry {
                value: "1".into(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock();
        let _ = entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Wrapper that can be switched into a failing state, for exercising
/// fail-open and degrade paths in tests.
pub struct FlakySharedStore {
    inner: MemorySharedStore,
    failing: AtomicBool,
}

impl Default for FlakySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakySharedStore {
    /// Create a healthy store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemorySharedStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    /// Toggle the failing state.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for FlakySharedStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        self.check()?;
        self.inner.incr_with_ttl(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }
}
