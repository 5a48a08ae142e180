//! Per-connection WebSocket session.
//!
//! Lifecycle: extract the handshake credential, verify the identity,
//! admit into the registry, then run the read loop until the transport
//! closes. Authentication and admission failures emit exactly one error
//! event and close the socket; everything after admission is
//! event-scoped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use banter_auth::{Credential, extract_credential};
use banter_core::{ConnectionId, GatewayError, Identity};
use banter_registry::{ClientConnection, ConnectionMeta};

use crate::dispatch::{broadcast_to_room, handle_event};
use crate::events::ServerEvent;
use crate::presence::PresenceEvent;
use crate::state::GatewayState;

/// Outbound channel depth per connection. Typing storms past this are
/// dropped, not queued.
const SEND_BUFFER: usize = 256;

/// Axum handler for the `/ws` route.
pub async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let credential = credential_from_handshake(&headers, &params);
    let client = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_owned();
    ws.on_upgrade(move |socket| run_session(state, socket, credential, client))
}

/// Extract the credential per the handshake priority order: explicit
/// `auth` field, bearer header, `token` query parameter.
fn credential_from_handshake(
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Option<Credential> {
    let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_credential(
        params.get("auth").map(String::as_str),
        bearer,
        params.get("token").map(String::as_str),
    )
}

/// Send one fatal error event and close the socket.
async fn reject(socket: WebSocket, err: &GatewayError) {
    counter!("gateway_rejections_total", "code" => err.code()).increment(1);
    let mut socket = socket;
    let event = ServerEvent::error(err);
    if let Ok(json) = serde_json::to_string(&event) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
    let _ = socket.close().await;
}

#[instrument(skip_all, fields(conn, user))]
async fn run_session(
    state: Arc<GatewayState>,
    socket: WebSocket,
    credential: Option<Credential>,
    client: String,
) {
    // Connecting → Authenticated
    let identity: Identity = {
        let Some(credential) = credential else {
            info!("handshake without credential");
            reject(
                socket,
                &GatewayError::AuthenticationFailure {
                    reason: "missing credential".into(),
                },
            )
            .await;
            return;
        };
        match state.verifier.verify(&credential).await {
            Ok(identity) => identity,
            Err(e) => {
                info!(error = %e, "credential rejected");
                reject(
                    socket,
                    &GatewayError::AuthenticationFailure { reason: e.to_string() },
                )
                .await;
                return;
            }
        }
    };

    let conn_id = ConnectionId::new();
    let _ = tracing::Span::current().record("conn", conn_id.as_str());
    let _ = tracing::Span::current().record("user", identity.id.as_str());

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_BUFFER);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));

    // Admission control: cap check and insert are atomic per identity.
    if !state
        .registry
        .admit(&identity.id, connection.clone(), ConnectionMeta::new(client))
    {
        reject(
            socket,
            &GatewayError::AdmissionRejected {
                cap: state.registry.max_per_user(),
            },
        )
        .await;
        return;
    }
    if state.registry.count(&identity.id) == 1 {
        state.presence.emit(PresenceEvent::Online(identity.id.clone()));
    }

    let connected_at = std::time::Instant::now();
    info!(client = %state.registry.meta(&conn_id).map(|m| m.client).unwrap_or_default(), "connection admitted");
    counter!("gateway_connections_total").increment(1);
    gauge!("gateway_connections_active").increment(1.0);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Greeting with the connection ID (clients key reconnect logic on it).
    let greeting = ServerEvent::connected(conn_id.as_str(), &identity);
    if let Ok(json) = serde_json::to_string(&greeting) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with heartbeat pings.
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        let _ = ticker.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read loop: Authenticated → Idle → InRoom → … → Disconnected
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    debug!(len = data.len(), "non-UTF8 binary frame ignored");
                    None
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };

        let ack = handle_event(&state, &conn_id, &identity, &text).await;
        if !connection.send(ack.to_shared_json()) {
            debug!("ack dropped (channel full or closed)");
        }
    }

    // Disconnected: membership first, then registration, then presence.
    if let Some(room) = state.rooms.leave(&conn_id) {
        let left = ServerEvent::new(
            "userLeft",
            serde_json::json!({ "roomId": room, "userId": identity.id }),
        );
        let _ = broadcast_to_room(&state, &room, &left, None);
    }
    if let Some(user) = state.registry.remove(&conn_id) {
        state.presence.emit(PresenceEvent::Offline(user));
    }

    info!("connection closed");
    gauge!("gateway_connections_active").decrement(1.0);
    histogram!("gateway_connection_seconds").record(connected_at.elapsed().as_secs_f64());
    outbound.abort();
}
