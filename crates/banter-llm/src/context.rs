//! Prompt assembly for assistant replies.
//!
//! The assembled prompt is, in order: one system message, up to `k`
//! retrieved similar messages tagged with their original role and
//! prefixed as contextual, the room's recent history in chronological
//! order, and the current user message. Retrieval failure degrades to
//! system + recent + current; the pipeline never fails because retrieval
//! failed.

use std::sync::Arc;

use tracing::warn;

use banter_core::{MessageId, Role, RoomId};
use banter_retrieval::RetrievalService;
use banter_store::RecordStore;

use crate::provider::PromptMessage;

/// Hard cap on assembled entries. Past it, entry 0 (the system message)
/// and the last [`KEPT_TAIL`] entries survive — recency over breadth.
pub const MAX_CONTEXT_ENTRIES: usize = 9;

/// Tail entries kept by truncation.
const KEPT_TAIL: usize = MAX_CONTEXT_ENTRIES - 1;

/// Base system instruction for the assistant.
const BASE_INSTRUCTION: &str = "You are a helpful assistant in a group chat room. \
Answer concisely and stay on topic.";

/// Note appended to the system message when retrieved context is present.
const CONTEXT_NOTE: &str = " Earlier messages from this room that may be relevant \
are included and marked as context.";

/// Prefix applied to retrieved context entries.
const CONTEXT_PREFIX: &str = "[context] ";

/// Builds role-tagged prompts from retrieval plus recent history.
pub struct ContextAssembler {
    records: Arc<dyn RecordStore>,
    retrieval: Arc<RetrievalService>,
    similar_k: usize,
    recent_limit: usize,
}

impl ContextAssembler {
    /// Create an assembler.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        retrieval: Arc<RetrievalService>,
        similar_k: usize,
        recent_limit: usize,
    ) -> Self {
        Self {
            records,
            retrieval,
            similar_k,
            recent_limit,
        }
    }

    /// Assemble the prompt for a reply to `user_text` in `room`.
    ///
    /// `current_id` is the already-persisted message carrying
    /// `user_text`; it is filtered from recent history so the prompt
    /// carries it exactly once.
    pub async fn prepare(
        &self,
        user_text: &str,
        room: &RoomId,
        current_id: Option<&MessageId>,
    ) -> Vec<PromptMessage> {
        let similar = self.retrieval.find_similar(user_text, room, self.similar_k).await;

        let recent = match self.records.recent_messages(room, self.recent_limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room = %room, error = %e, "recent history unavailable, degrading");
                Vec::new()
            }
        };

        let mut prompt = Vec::with_capacity(2 + similar.len() + recent.len());

        let system_text = if similar.is_empty() {
            BASE_INSTRUCTION.to_string()
        } else {
            format!("{BASE_INSTRUCTION}{CONTEXT_NOTE}")
        };
        prompt.push(PromptMessage::new(Role::System, system_text));

        for (message, _similarity) in &similar {
            prompt.push(PromptMessage::new(
                message.role,
                format!("{CONTEXT_PREFIX}{}", message.content),
            ));
        }

        for message in &recent {
            if current_id == Some(&message.id) {
                continue;
            }
            prompt.push(PromptMessage::new(message.role, message.content.clone()));
        }

        prompt.push(PromptMessage::new(Role::User, user_text.to_string()));

        truncate_keeping_head(prompt)
    }
}

/// Apply the truncation policy: if the list exceeds
/// [`MAX_CONTEXT_ENTRIES`], keep entry 0 plus the last [`KEPT_TAIL`]
/// entries.
#[must_use]
fn truncate_keeping_head(mut prompt: Vec<PromptMessage>) -> Vec<PromptMessage> {
    if prompt.len() <= MAX_CONTEXT_ENTRIES {
        return prompt;
    }
    let tail_start = prompt.len() - KEPT_TAIL;
    let mut truncated = Vec::with_capacity(MAX_CONTEXT_ENTRIES);
    truncated.push(prompt.remove(0));
    truncated.extend(prompt.drain(tail_start - 1..));
    truncated
}
