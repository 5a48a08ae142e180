//! # banter-auth
//!
//! Identity verification is an external collaborator — this crate defines
//! the interface the gateway depends on ([`TokenVerifier`]), the opaque
//! [`Credential`] type, and the handshake extraction order (explicit auth
//! field, bearer header, query parameter).
//!
//! [`StaticTokenVerifier`] is a map-backed implementation for tests and
//! local development.

#![deny(unsafe_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use banter_core::Identity;

/// Opaque credential extracted from a connection handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Verification failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No credential present in the handshake.
    #[error("no credential in handshake")]
    MissingCredential,

    /// The credential did not map to any identity.
    #[error("invalid credential")]
    InvalidCredential,

    /// The credential was recognized but is no longer valid.
    #[error("expired credential")]
    ExpiredCredential,

    /// The verification service itself failed.
    #[error("verification unavailable: {0}")]
    Unavailable(String),
}

/// Token-verification collaborator: maps an opaque credential to an
/// identity or rejects it.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a credential.
    async fn verify(&self, credential: &Credential) -> Result<Identity, AuthError>;
}

/// Extract a credential from handshake material.
///
/// Checked in priority order: explicit auth field, bearer-style header
/// (with or without the `Bearer ` prefix), query parameter.
#[must_use]
pub fn extract_credential(
    auth_field: Option<&str>,
    bearer_header: Option<&str>,
    query_token: Option<&str>,
) -> Option<Credential> {
    if let Some(token) = auth_field.filter(|t| !t.is_empty()) {
        return Some(Credential::new(token));
    }
    if let Some(header) = bearer_header {
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        if !token.is_empty() {
            return Some(Credential::new(token));
        }
    }
    query_token
        .filter(|t| !t.is_empty())
        .map(Credential::new)
}

/// Map-backed verifier for tests and local development.
#[derive(Default)]
pub struct StaticTokenVerifier {
    identities: HashMap<String, Identity>,
    expired: Vec<String>,
}

impl StaticTokenVerifier {
    /// Create an empty verifier (rejects everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token → identity mapping.
    #[must_use]
    pub fn with_identity(mut self, token: impl Into<String>, identity: Identity) -> Self {
        let _ = self.identities.insert(token.into(), identity);
        self
    }

    /// Register a token that verifies as expired.
    #[must_use]
    pub fn with_expired(mut self, token: impl Into<String>) -> Self {
        self.expired.push(token.into());
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &Credential) -> Result<Identity, AuthError> {
        if self.expired.iter().any(|t| t == credential.as_str()) {
            return Err(AuthError::ExpiredCredential);
        }
        self.identities
            .get(credential.as_str())
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}
