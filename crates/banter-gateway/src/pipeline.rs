//! Assistant reply pipeline.
//!
//! Spawned per user send, off the ack path: assemble context, stream the
//! reply fanning tokens to the room, persist the completed reply, and
//! queue its embedding. Provider failures become one localized error
//! event to the room; partial replies are never persisted, though tokens
//! already delivered stand.

use std::sync::Arc;

use metrics::{counter, histogram};
use serde_json::json;
use tracing::{debug, warn};

use banter_core::{ChatMessage, MessageId, RoomId};
use banter_llm::{CompletionOptions, StreamingClient};
use banter_store::RecordStore;

use crate::dispatch::broadcast_to_room;
use crate::events::ServerEvent;
use crate::state::GatewayState;

/// Kick off an assistant reply for a just-sent user message.
///
/// No-op when no completion provider is configured.
pub fn spawn_assistant_reply(
    state: Arc<GatewayState>,
    room: RoomId,
    user_text: String,
    user_message_id: MessageId,
) {
    if state.provider.is_none() {
        return;
    }
    let _ = tokio::spawn(async move {
        run_reply(&state, &room, &user_text, &user_message_id).await;
    });
}

async fn run_reply(
    state: &Arc<GatewayState>,
    room: &RoomId,
    user_text: &str,
    user_message_id: &MessageId,
) {
    let Some(provider) = state.provider.clone() else {
        return;
    };
    let start = std::time::Instant::now();

    let prompt = state
        .assembler
        .prepare(user_text, room, Some(user_message_id))
        .await;

    let client = StreamingClient::with_timeout(
        provider,
        std::time::Duration::from_secs(state.config.reply_timeout_secs),
    );
    let options = CompletionOptions {
        max_tokens: state.config.reply_max_tokens,
        temperature: state.config.reply_temperature,
    };

    let token_state = Arc::clone(state);
    let token_room = room.clone();
    let result = client
        .stream_reply(&prompt, &options, move |token| {
            let event = ServerEvent::new(
                "assistantToken",
                json!({ "roomId": token_room, "token": token }),
            );
            let _ = broadcast_to_room(&token_state, &token_room, &event, None);
        })
        .await;

    match result {
        Ok(text) => {
            histogram!("assistant_reply_seconds").record(start.elapsed().as_secs_f64());
            if text.trim().is_empty() {
                debug!(room = %room, "provider returned an empty reply, nothing to persist");
                return;
            }
            let reply = ChatMessage::from_assistant(room.clone(), text);

            // Absorb persistence failures; the room already saw the tokens.
            if let Err(e) = state.records.insert_message(&reply).await {
                warn!(message = %reply.id, error = %e, "assistant reply persistence failed");
            } else {
                let retrieval = Arc::clone(&state.retrieval);
                let reply_id = reply.id.clone();
                let reply_text = reply.content.clone();
                let _ = tokio::spawn(async move {
                    retrieval.store_embedding(&reply_id, &reply_text).await;
                });
            }

            let event = ServerEvent::message(&reply);
            let _ = broadcast_to_room(state, room, &event, None);
        }
        Err(e) => {
            counter!("assistant_reply_errors_total", "category" => e.category()).increment(1);
            let gateway_err = e.to_gateway_error();
            warn!(room = %room, category = e.category(), error = %e, "assistant reply failed");
            let event = ServerEvent::error(&gateway_err);
            let _ = broadcast_to_room(state, room, &event, None);
        }
    }
}
