//! # banter-llm
//!
//! The assistant half of the gateway:
//!
//! - [`CompletionProvider`] trait over token-streaming text completion,
//!   with the structured [`ProviderError`] taxonomy
//! - SSE line parsing shared by HTTP providers
//! - [`OpenAiCompatProvider`] — streaming `chat/completions` client
//! - [`ContextAssembler`] — system + retrieved context + recent history +
//!   current message, with recency-first truncation
//! - [`StreamingClient`] — drives a provider stream under a hard deadline,
//!   invoking a token callback per delta

#![deny(unsafe_code)]

pub mod client;
pub mod context;
pub mod error_body;
pub mod openai;
pub mod provider;
pub mod sse;

pub use client::StreamingClient;
pub use context::ContextAssembler;
pub use openai::OpenAiCompatProvider;
pub use provider::{
    CompletionOptions, CompletionProvider, PromptMessage, ProviderError, StreamDelta, TokenStream,
};
