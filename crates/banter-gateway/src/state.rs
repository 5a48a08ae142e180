//! Shared gateway state.
//!
//! One explicitly constructed instance wired at startup and injected
//! everywhere — no ambient singletons, so tests build a fresh state per
//! case.

use std::sync::Arc;

use banter_auth::TokenVerifier;
use banter_limiter::RateLimiter;
use banter_llm::{CompletionProvider, ContextAssembler};
use banter_registry::ConnectionRegistry;
use banter_retrieval::RetrievalService;
use banter_store::RecordStore;

use crate::config::GatewayConfig;
use crate::presence::PresenceBus;
use crate::rooms::RoomDirectory;

/// Everything a connection handler needs.
pub struct GatewayState {
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Identity verification collaborator.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Room membership tables.
    pub rooms: Arc<RoomDirectory>,
    /// Fixed-window rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Record store collaborator.
    pub records: Arc<dyn RecordStore>,
    /// Embedding + similarity retrieval service.
    pub retrieval: Arc<RetrievalService>,
    /// Prompt assembler for assistant replies.
    pub assembler: Arc<ContextAssembler>,
    /// Completion provider; `None` disables assistant replies.
    pub provider: Option<Arc<dyn CompletionProvider>>,
    /// Presence transition hook.
    pub presence: PresenceBus,
}
