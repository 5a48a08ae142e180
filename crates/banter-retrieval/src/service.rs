//! Retrieval service — cached embedding, similarity search, and
//! asynchronous embedding attachment.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use banter_core::{ChatMessage, MessageId, RoomId};
use banter_store::RecordStore;

use crate::cache::EmbeddingCache;
use crate::embedder::{Embedder, FallbackEmbedder};

/// Result of a backfill run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackfillOutcome {
    /// Messages successfully embedded and attached.
    pub succeeded: usize,
    /// Messages whose embedding or attachment failed.
    pub failed: usize,
    /// Messages skipped (empty text).
    pub skipped: usize,
}

/// Orchestrates the embedding cache, the embedder chain, and the record
/// store's vector queries.
pub struct RetrievalService {
    records: Arc<dyn RecordStore>,
    cache: EmbeddingCache,
    /// Primary embedding provider, if one is configured.
    primary: Option<Arc<dyn Embedder>>,
    fallback: FallbackEmbedder,
    /// Backfill batch size.
    batch_size: usize,
    /// Pause between backfill batches (respects provider limits).
    batch_pause: Duration,
}

impl RetrievalService {
    /// Create a service with no primary embedder (fallback only).
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, cache: EmbeddingCache) -> Self {
        Self {
            records,
            cache,
            primary: None,
            fallback: FallbackEmbedder::new(),
            batch_size: 16,
            batch_pause: Duration::from_millis(200),
        }
    }

    /// Install a primary embedding provider.
    #[must_use]
    pub fn with_primary(mut self, primary: Arc<dyn Embedder>) -> Self {
        self.primary = Some(primary);
        self
    }

    /// Override the backfill batching parameters.
    #[must_use]
    pub fn with_batching(mut self, batch_size: usize, batch_pause: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_pause = batch_pause;
        self
    }

    /// Embed a text, consulting the cache first.
    ///
    /// On a miss the primary provider is tried when configured; any
    /// provider error falls through to the deterministic fallback, so
    /// this only errors for unembeddable input (empty text).
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::embedder::EmbedError> {
        if let Some(cached) = self.cache.get(text).await {
            debug!("embedding cache hit");
            return Ok(cached);
        }

        let vector = match &self.primary {
            Some(primary) => match primary.embed(text).await {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "primary embedder failed, using fallback");
                    self.fallback.embed(text).await?
                }
            },
            None => self.fallback.embed(text).await?,
        };

        self.cache.put(text, &vector).await;
        Ok(vector)
    }

    /// The `k` messages in `room` most similar to `text`, descending.
    ///
    /// Best-effort context enrichment: embedding or search failures yield
    /// an empty list, never an error.
    pub async fn find_similar(
        &self,
        text: &str,
        room: &RoomId,
        k: usize,
    ) -> Vec<(ChatMessage, f32)> {
        let query = match self.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                debug!(room = %room, error = %e, "similarity query not embeddable");
                return Vec::new();
            }
        };
        match self.records.similar_messages(room, &query, k).await {
            Ok(results) => results,
            Err(e) => {
                warn!(room = %room, error = %e, "similarity search failed, returning no context");
                Vec::new()
            }
        }
    }

    /// Compute and attach an embedding to a stored message.
    ///
    /// Failures are logged and swallowed — embedding storage must never
    /// block or fail the message-send path.
    pub async fn store_embedding(&self, message: &MessageId, text: &str) {
        let vector = match self.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                debug!(message = %message, error = %e, "skipping embedding attach");
                return;
            }
        };
        if let Err(e) = self.records.attach_embedding(message, &vector).await {
            warn!(message = %message, error = %e, "embedding attach failed");
        }
    }

    /// Backfill embeddings for messages in a room that still lack one.
    ///
    /// Processes bounded-size batches with a pause in between; a failure
    /// on one message never aborts the batch.
    pub async fn backfill(&self, room: &RoomId, limit: usize) -> BackfillOutcome {
        let mut outcome = BackfillOutcome::default();
        let pending = match self.records.messages_missing_embedding(room, limit).await {
            Ok(p) => p,
            Err(e) => {
                warn!(room = %room, error = %e, "backfill feed unavailable");
                return outcome;
            }
        };

        let mut first_batch = true;
        for batch in pending.chunks(self.batch_size) {
            if !first_batch {
                tokio::time::sleep(self.batch_pause).await;
            }
            first_batch = false;

            for message in batch {
                if message.content.trim().is_empty() {
                    outcome.skipped += 1;
                    continue;
                }
                match self.embed(&message.content).await {
                    Ok(vector) => {
                        match self.records.attach_embedding(&message.id, &vector).await {
                            Ok(()) => outcome.succeeded += 1,
                            Err(e) => {
                                warn!(message = %message.id, error = %e, "backfill attach failed");
                                outcome.failed += 1;
                            }
                        }
                    }
                    Err(e) => {
                        debug!(message = %message.id, error = %e, "backfill embed failed");
                        outcome.failed += 1;
                    }
                }
            }
        }

        debug!(
            room = %room,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "backfill complete"
        );
        outcome
    }
}
