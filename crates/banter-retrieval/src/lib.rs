//! # banter-retrieval
//!
//! The embedding and similarity-retrieval half of the assistant pipeline:
//!
//! - [`Embedder`] trait with a deterministic, dependency-free
//!   [`FallbackEmbedder`] (hash-scatter vectors, always available)
//! - [`EmbeddingCache`] — content-addressed cache over the shared store,
//!   bounded TTL, never a correctness dependency
//! - [`RetrievalService`] — cached embedding with a primary→fallback
//!   chain, best-effort similarity search, swallowed-failure embedding
//!   attachment, and batched backfill
//!
//! Everything here degrades: retrieval failures produce empty context,
//! never errors on the message path.

#![deny(unsafe_code)]

pub mod cache;
pub mod embedder;
pub mod service;

pub use cache::EmbeddingCache;
pub use embedder::{EmbedError, Embedder, FallbackEmbedder, EMBEDDING_DIMENSIONS};
pub use service::{BackfillOutcome, RetrievalService};
