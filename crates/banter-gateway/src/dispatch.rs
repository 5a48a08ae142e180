//! Event dispatch — parses a client envelope and routes it.
//!
//! Every handler returns the acknowledgement envelope for the calling
//! connection; broadcasts to other members happen inside the handler.
//! Errors here are event-scoped: the connection and its room membership
//! stay intact.

use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use tracing::{debug, instrument, warn};

use banter_core::{ChatMessage, ConnectionId, GatewayError, Identity, RoomId};
use banter_limiter::EventKind;
use banter_store::RecordStore;

use crate::events::{ClientEvent, RoomPayload, SendPayload, ServerEvent, TypingPayload};
use crate::pipeline;
use crate::state::GatewayState;

/// Serialize an event once and deliver it to every member connection of
/// a room, optionally excluding one connection. Best-effort: dead or
/// slow members never abort delivery to the rest.
pub fn broadcast_to_room(
    state: &GatewayState,
    room: &RoomId,
    event: &ServerEvent,
    exclude: Option<&ConnectionId>,
) -> usize {
    let payload = event.to_shared_json();
    let mut delivered = 0;
    for member in state.rooms.members(room) {
        if exclude == Some(&member) {
            continue;
        }
        match state.registry.handle(&member) {
            Some(handle) => {
                if handle.send(Arc::clone(&payload)) {
                    delivered += 1;
                } else {
                    warn!(room = %room, conn = %member, "room fan-out drop");
                }
            }
            None => {
                // Membership can outlive registration for a moment during
                // disconnect; skip silently.
                debug!(room = %room, conn = %member, "member without registry handle");
            }
        }
    }
    delivered
}

/// Handle one incoming text frame, returning the acknowledgement to send
/// back on the calling connection.
#[instrument(skip_all, fields(conn = %conn, event))]
pub async fn handle_event(
    state: &Arc<GatewayState>,
    conn: &ConnectionId,
    identity: &Identity,
    raw: &str,
) -> ServerEvent {
    let parsed: ClientEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "unparseable client frame");
            return ServerEvent::error(&GatewayError::ValidationFailure {
                reason: format!("invalid event JSON: {e}"),
            });
        }
    };
    let _ = tracing::Span::current().record("event", parsed.event.as_str());
    counter!("gateway_events_total", "event" => parsed.event.clone()).increment(1);

    match parsed.event.as_str() {
        "join" => handle_join(state, conn, identity, parsed.data).await,
        "leave" => handle_leave(state, conn, identity, parsed.data).await,
        "send" => handle_send(state, conn, identity, parsed.data).await,
        "typing" => handle_typing(state, conn, identity, parsed.data).await,
        "getRooms" => handle_get_rooms(state).await,
        other => ServerEvent::error(&GatewayError::ValidationFailure {
            reason: format!("unknown event '{other}'"),
        }),
    }
}

async fn handle_join(
    state: &Arc<GatewayState>,
    conn: &ConnectionId,
    identity: &Identity,
    data: serde_json::Value,
) -> ServerEvent {
    let payload: RoomPayload = match serde_json::from_value(data) {
        Ok(p) => p,
        Err(e) => {
            return ServerEvent::error(&GatewayError::ValidationFailure {
                reason: format!("bad join payload: {e}"),
            });
        }
    };

    if !state.limiter.allow(&identity.id, EventKind::RoomChange).await {
        return ServerEvent::error(&GatewayError::RateLimited {
            kind: EventKind::RoomChange.as_str().into(),
        });
    }

    if let Some(previous) = state.rooms.join(conn, &payload.room_id) {
        let left = ServerEvent::new(
            "userLeft",
            json!({ "roomId": previous, "userId": identity.id }),
        );
        let _ = broadcast_to_room(state, &previous, &left, None);
    }

    let joined = ServerEvent::new(
        "userJoined",
        json!({
            "roomId": payload.room_id,
            "userId": identity.id,
            "displayName": identity.display_name,
        }),
    );
    let _ = broadcast_to_room(state, &payload.room_id, &joined, Some(conn));

    debug!(room = %payload.room_id, "joined room");
    ServerEvent::new(
        "joined",
        json!({
            "roomId": payload.room_id,
            "members": state.rooms.member_count(&payload.room_id),
        }),
    )
}

async fn handle_leave(
    state: &Arc<GatewayState>,
    conn: &ConnectionId,
    identity: &Identity,
    data: serde_json::Value,
) -> ServerEvent {
    let payload: RoomPayload = match serde_json::from_value(data) {
        Ok(p) => p,
        Err(e) => {
            return ServerEvent::error(&GatewayError::ValidationFailure {
                reason: format!("bad leave payload: {e}"),
            });
        }
    };

    if state.rooms.room_of(conn).as_ref() != Some(&payload.room_id) {
        return ServerEvent::error(&GatewayError::ValidationFailure {
            reason: "not in that room".into(),
        });
    }

    if !state.limiter.allow(&identity.id, EventKind::RoomChange).await {
        return ServerEvent::error(&GatewayError::RateLimited {
            kind: EventKind::RoomChange.as_str().into(),
        });
    }

    let _ = state.rooms.leave(conn);
    let left = ServerEvent::new(
        "userLeft",
        json!({ "roomId": payload.room_id, "userId": identity.id }),
    );
    let _ = broadcast_to_room(state, &payload.room_id, &left, None);

    ServerEvent::new("left", json!({ "roomId": payload.room_id }))
}

async fn handle_send(
    state: &Arc<GatewayState>,
    conn: &ConnectionId,
    identity: &Identity,
    data: serde_json::Value,
) -> ServerEvent {
    let payload: SendPayload = match serde_json::from_value(data) {
        Ok(p) => p,
        Err(e) => {
            return ServerEvent::error(&GatewayError::ValidationFailure {
                reason: format!("bad send payload: {e}"),
            });
        }
    };

    if state.rooms.room_of(conn).as_ref() != Some(&payload.room_id) {
        return ServerEvent::error(&GatewayError::ValidationFailure {
            reason: "join the room before sending".into(),
        });
    }

    let text = payload.text.trim();
    if text.is_empty() {
        return ServerEvent::error(&GatewayError::ValidationFailure {
            reason: "empty message".into(),
        });
    }

    // Generic quota first; the long-message quota is only consulted once
    // the generic check passed.
    if !state.limiter.allow(&identity.id, EventKind::Message).await {
        return ServerEvent::error(&GatewayError::RateLimited {
            kind: EventKind::Message.as_str().into(),
        });
    }
    if text.chars().count() >= state.config.long_message_threshold
        && !state.limiter.allow(&identity.id, EventKind::LongMessage).await
    {
        return ServerEvent::error(&GatewayError::RateLimited {
            kind: EventKind::LongMessage.as_str().into(),
        });
    }

    let message = ChatMessage::from_user(payload.room_id.clone(), identity.id.clone(), text);

    // Persistence failures are logged and absorbed: the ack path must not
    // depend on durability of secondary effects.
    if let Err(e) = state
        .records
        .ensure_room(&payload.room_id, payload.room_id.as_str())
        .await
    {
        warn!(room = %payload.room_id, error = %e, "room persistence failed");
    }
    if let Err(e) = state.records.insert_message(&message).await {
        warn!(message = %message.id, error = %e, "message persistence failed");
    }

    // Fan out to every member — the sender's connection included, so all
    // of the sender's devices converge.
    let broadcast = ServerEvent::message(&message);
    let _ = broadcast_to_room(state, &payload.room_id, &broadcast, None);

    pipeline::spawn_assistant_reply(
        Arc::clone(state),
        payload.room_id.clone(),
        text.to_owned(),
        message.id.clone(),
    );

    ServerEvent::new("sent", serde_json::to_value(&message).unwrap_or_default())
}

async fn handle_typing(
    state: &Arc<GatewayState>,
    conn: &ConnectionId,
    identity: &Identity,
    data: serde_json::Value,
) -> ServerEvent {
    let payload: TypingPayload = match serde_json::from_value(data) {
        Ok(p) => p,
        Err(e) => {
            return ServerEvent::error(&GatewayError::ValidationFailure {
                reason: format!("bad typing payload: {e}"),
            });
        }
    };

    if state.rooms.room_of(conn).as_ref() != Some(&payload.room_id) {
        return ServerEvent::error(&GatewayError::ValidationFailure {
            reason: "not in that room".into(),
        });
    }

    if !state.limiter.allow(&identity.id, EventKind::Typing).await {
        return ServerEvent::error(&GatewayError::RateLimited {
            kind: EventKind::Typing.as_str().into(),
        });
    }

    // Transient: forwarded to other members, never persisted.
    let typing = ServerEvent::new(
        "userTyping",
        json!({
            "roomId": payload.room_id,
            "userId": identity.id,
            "isTyping": payload.is_typing,
        }),
    );
    let _ = broadcast_to_room(state, &payload.room_id, &typing, Some(conn));

    ServerEvent::new(
        "typingAck",
        json!({ "roomId": payload.room_id, "isTyping": payload.is_typing }),
    )
}

async fn handle_get_rooms(state: &Arc<GatewayState>) -> ServerEvent {
    let rooms = match state.records.list_rooms().await {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!(error = %e, "room listing unavailable");
            Vec::new()
        }
    };
    ServerEvent::new(
        "rooms",
        json!({ "rooms": serde_json::to_value(rooms).unwrap_or_default() }),
    )
}
