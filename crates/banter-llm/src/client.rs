//! Streaming reply client.
//!
//! Drives a provider stream under one hard deadline covering the whole
//! reply. Each text delta invokes the caller's token callback before
//! being accumulated; on deadline expiry the in-flight stream is dropped
//! and [`ProviderError::Timeout`] is returned — tokens already flushed
//! stand, nothing is retracted, and no partial reply is persisted by the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::provider::{
    CompletionOptions, CompletionProvider, PromptMessage, ProviderError, StreamDelta,
};

/// Default reply deadline.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline-bounded streaming reply driver.
pub struct StreamingClient {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl StreamingClient {
    /// Create a client with the default 30-second deadline.
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self::with_timeout(provider, DEFAULT_REPLY_TIMEOUT)
    }

    /// Create a client with a custom deadline.
    #[must_use]
    pub fn with_timeout(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Stream one reply, invoking `on_token` for each text delta.
    ///
    /// Returns the concatenated reply text on success. The deadline spans
    /// request setup and the entire stream.
    pub async fn stream_reply<F>(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
        mut on_token: F,
    ) -> Result<String, ProviderError>
    where
        F: FnMut(&str) + Send,
    {
        let deadline = Instant::now() + self.timeout;

        let mut stream = timeout_at(deadline, self.provider.stream(messages, options))
            .await
            .map_err(|_| ProviderError::Timeout)??;

        let mut full_text = String::new();
        loop {
            let next = timeout_at(deadline, stream.next())
                .await
                .map_err(|_| ProviderError::Timeout)?;
            match next {
                Some(Ok(StreamDelta::Text(delta))) => {
                    on_token(&delta);
                    full_text.push_str(&delta);
                }
                Some(Ok(StreamDelta::Done)) | None => break,
                Some(Err(e)) => return Err(e),
            }
        }

        debug!(
            provider = self.provider.name(),
            chars = full_text.len(),
            "reply stream complete"
        );
        Ok(full_text)
    }
}
