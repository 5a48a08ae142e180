//! Completion provider trait and error taxonomy.
//!
//! The provider returns a boxed stream of [`StreamDelta`]s so the
//! pipeline can fan tokens out to a room as they arrive, regardless of
//! the underlying API format.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use banter_core::{GatewayError, Role};

/// One role-tagged entry in an assembled prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMessage {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// Build a prompt entry.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Options for a completion request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Incremental output from a provider stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamDelta {
    /// A text fragment.
    Text(String),
    /// The stream completed normally.
    Done,
}

/// Boxed stream of deltas returned by [`CompletionProvider::stream`].
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, ProviderError>> + Send>>;

/// Errors from completion providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected our credentials.
    #[error("auth error: {message}")]
    Auth {
        /// Error description (internal only).
        message: String,
    },

    /// Rate limited by the provider.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
    },

    /// The reply deadline elapsed.
    #[error("stream timed out")]
    Timeout,

    /// The provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description (internal only).
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// The stream payload could not be parsed.
    #[error("parse error: {message}")]
    Parse {
        /// Error description.
        message: String,
    },

    /// Anything else.
    #[error("{message}")]
    Unknown {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Error category string for logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Timeout => "timeout",
            Self::Api { .. } => "api",
            Self::Parse { .. } => "parse",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Map into the gateway's user-facing taxonomy. Raw provider
    /// payloads never cross this boundary.
    #[must_use]
    pub fn to_gateway_error(&self) -> GatewayError {
        match self {
            Self::Http(_) => GatewayError::ProviderNetworkError,
            Self::Auth { .. } => GatewayError::ProviderAuthError,
            Self::RateLimited { .. } => GatewayError::ProviderRateLimit,
            Self::Timeout => GatewayError::ProviderTimeout,
            Self::Api { status, .. } => match status {
                401 | 403 => GatewayError::ProviderAuthError,
                429 => GatewayError::ProviderRateLimit,
                _ => GatewayError::ProviderUnknownError,
            },
            Self::Parse { .. } | Self::Unknown { .. } => GatewayError::ProviderUnknownError,
        }
    }
}

/// Token-streaming text-completion collaborator.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier for logging.
    fn name(&self) -> &str;

    /// Stream a completion for the given prompt.
    async fn stream(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn prompt_message_serde_camel_case() {
        let msg = PromptMessage::new(Role::User, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn default_options() {
        let opts = CompletionOptions::default();
        assert_eq!(opts.max_tokens, 1024);
        assert!((opts.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn categories_cover_all_variants() {
        let cases: Vec<(ProviderError, &str)> = vec![
            (ProviderError::Auth { message: "x".into() }, "auth"),
            (ProviderError::RateLimited { retry_after_ms: 100 }, "rate_limit"),
            (ProviderError::Timeout, "timeout"),
            (
                ProviderError::Api { status: 500, message: "x".into(), retryable: true },
                "api",
            ),
            (ProviderError::Parse { message: "x".into() }, "parse"),
            (ProviderError::Unknown { message: "x".into() }, "unknown"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.category(), expected);
        }
    }

    #[test]
    fn gateway_mapping_is_total_and_distinct_where_required() {
        assert_matches!(
            ProviderError::Auth { message: String::new() }.to_gateway_error(),
            GatewayError::ProviderAuthError
        );
        assert_matches!(
            ProviderError::RateLimited { retry_after_ms: 0 }.to_gateway_error(),
            GatewayError::ProviderRateLimit
        );
        assert_matches!(ProviderError::Timeout.to_gateway_error(), GatewayError::ProviderTimeout);
        assert_matches!(
            ProviderError::Parse { message: String::new() }.to_gateway_error(),
            GatewayError::ProviderUnknownError
        );
    }

    #[test]
    fn api_status_refines_gateway_mapping() {
        let auth = ProviderError::Api { status: 401, message: "no".into(), retryable: false };
        assert_matches!(auth.to_gateway_error(), GatewayError::ProviderAuthError);

        let limited = ProviderError::Api { status: 429, message: "slow".into(), retryable: true };
        assert_matches!(limited.to_gateway_error(), GatewayError::ProviderRateLimit);

        let other = ProviderError::Api { status: 500, message: "boom".into(), retryable: true };
        assert_matches!(other.to_gateway_error(), GatewayError::ProviderUnknownError);
    }

    #[test]
    fn gateway_error_messages_never_contain_provider_payloads() {
        let err = ProviderError::Api {
            status: 500,
            message: "secret internal payload".into(),
            retryable: false,
        };
        let user = err.to_gateway_error().user_message();
        assert!(!user.contains("secret"));
    }

    #[test]
    fn provider_is_object_safe() {
        fn assert_object_safe(_: &dyn CompletionProvider) {}
        let _ = assert_object_safe;
    }
}
