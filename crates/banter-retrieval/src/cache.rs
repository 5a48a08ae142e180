//! Content-addressed embedding cache over the shared store.
//!
//! Key = `emb:` + SHA-256 hex of the input text; value = base64 of the
//! little-endian f32 blob. Entries are derived data with a bounded TTL —
//! absence is not an error and store failures degrade to recomputation.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use tracing::debug;

use banter_store::blob::{blob_to_f32_vec, f32_slice_to_blob};
use banter_store::SharedStore;

/// Default cache TTL: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Read-through/write-through embedding cache.
pub struct EmbeddingCache {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl EmbeddingCache {
    /// Create a cache with the default 24-hour TTL.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    /// Create a cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Deterministic digest key for an input text.
    #[must_use]
    pub fn key(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        format!("emb:{digest:x}")
    }

    /// Look up a cached vector. Any store failure or undecodable entry
    /// reads as a miss.
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = Self::key(text);
        match self.store.get(&key).await {
            Ok(Some(encoded)) => match BASE64.decode(&encoded) {
                Ok(blob) => Some(blob_to_f32_vec(&blob)),
                Err(_) => {
                    debug!(key, "undecodable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key, error = %e, "embedding cache read failed");
                None
            }
        }
    }

    /// Write a vector through. Failures are logged and ignored — the
    /// cache is an optimization, never a correctness dependency.
    pub async fn put(&self, text: &str, vector: &[f32]) {
        let key = Self::key(text);
        let encoded = BASE64.encode(f32_slice_to_blob(vector));
        if let Err(e) = self.store.set_with_ttl(&key, &encoded, self.ttl).await {
            debug!(key, error = %e, "embedding cache write failed");
        }
    }
}
