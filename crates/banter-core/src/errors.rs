//! Gateway error taxonomy.
//!
//! Fatal errors (`AuthenticationFailure`, `AdmissionRejected`) terminate the
//! connection after one error event. Event-scoped errors produce an error
//! ack and leave the connection and room membership intact. Retrieval
//! failures are degraded silently and never reach a client.

use thiserror::Error;

/// Errors surfaced through the gateway event protocol.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Credential missing, invalid, or expired. Fatal.
    #[error("authentication failed: {reason}")]
    AuthenticationFailure {
        /// Internal reason, logged but never sent to the client.
        reason: String,
    },

    /// Per-identity connection cap exceeded. Fatal.
    #[error("connection cap reached ({cap})")]
    AdmissionRejected {
        /// Configured per-identity maximum.
        cap: usize,
    },

    /// Malformed or empty event payload. Event-scoped.
    #[error("validation failed: {reason}")]
    ValidationFailure {
        /// What was wrong with the payload.
        reason: String,
    },

    /// Fixed-window quota exceeded. Event-scoped, retryable later.
    #[error("rate limited: {kind}")]
    RateLimited {
        /// Event kind key that was throttled.
        kind: String,
    },

    /// Similarity retrieval failed. Silently degraded, never surfaced.
    #[error("retrieval failed: {reason}")]
    RetrievalFailure {
        /// Internal reason.
        reason: String,
    },

    /// LLM provider rejected our credentials.
    #[error("provider authentication error")]
    ProviderAuthError,

    /// LLM provider rate limit.
    #[error("provider rate limit")]
    ProviderRateLimit,

    /// LLM stream exceeded the reply deadline.
    #[error("provider timeout")]
    ProviderTimeout,

    /// Network failure reaching the LLM provider.
    #[error("provider network error")]
    ProviderNetworkError,

    /// Anything else from the LLM provider.
    #[error("provider unknown error")]
    ProviderUnknownError,
}

impl GatewayError {
    /// Whether this error terminates the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure { .. } | Self::AdmissionRejected { .. }
        )
    }

    /// Stable machine-readable error code for the wire protocol.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure { .. } => "AUTHENTICATION_FAILURE",
            Self::AdmissionRejected { .. } => "ADMISSION_REJECTED",
            Self::ValidationFailure { .. } => "VALIDATION_FAILURE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::RetrievalFailure { .. } => "RETRIEVAL_FAILURE",
            Self::ProviderAuthError => "PROVIDER_AUTH_ERROR",
            Self::ProviderRateLimit => "PROVIDER_RATE_LIMIT",
            Self::ProviderTimeout => "PROVIDER_TIMEOUT",
            Self::ProviderNetworkError => "PROVIDER_NETWORK_ERROR",
            Self::ProviderUnknownError => "PROVIDER_UNKNOWN_ERROR",
        }
    }

    /// User-facing message. Never contains raw provider payloads or
    /// internal reasons.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure { .. } => "Authentication failed. Please sign in again.",
            Self::AdmissionRejected { .. } => {
                "Too many active devices for this account. Close another session and retry."
            }
            Self::ValidationFailure { .. } => "That message could not be processed.",
            Self::RateLimited { .. } => "You are sending too quickly. Please wait a moment.",
            Self::RetrievalFailure { .. } => "",
            Self::ProviderAuthError => {
                "The assistant is misconfigured and could not authenticate. Please contact support."
            }
            Self::ProviderRateLimit => {
                "The assistant is handling too many requests right now. Try again shortly."
            }
            Self::ProviderTimeout => "The assistant took too long to respond. Try again.",
            Self::ProviderNetworkError => {
                "The assistant could not be reached. Check back in a moment."
            }
            Self::ProviderUnknownError => "The assistant ran into an unexpected problem.",
        }
    }
}
