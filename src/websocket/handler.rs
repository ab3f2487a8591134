use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::UserIdentity;
use crate::events::{ClientEvent, OutboundEvent, ServerEvent};
use crate::hub::ConnectionHandle;
use crate::metrics::{
    CONNECTIONS_ACTIVE, MALFORMED_EVENTS, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
};
use crate::server::AppState;

/// WebSocket upgrade handler.
///
/// The handshake is authenticated before the upgrade completes; a refused
/// credential never touches the registry.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state, headers))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let identity = match state.authenticator.authenticate(&headers).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    tracing::info!(user_id = %identity.id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Drive an established, authenticated connection until it closes.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, identity),
    fields(user_id = %identity.id)
)]
async fn handle_socket(socket: WebSocket, state: AppState, identity: UserIdentity) {
    let connection_start = std::time::Instant::now();

    // Per-connection outbound queue; the registry keeps the sending half
    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(state.settings.websocket.channel_buffer);
    let handle = state.router.hub().registry.register(identity, tx);
    let connection_id = handle.id;

    WS_CONNECTIONS_OPENED.inc();
    CONNECTIONS_ACTIVE.inc();

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id(),
        "WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for draining the outbound queue into the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for routing inbound events
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Whichever task ends first, the connection is done
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Graceful close and abrupt disconnect converge here
    state.router.on_disconnect(connection_id).await;

    WS_CONNECTIONS_CLOSED.inc();
    CONNECTIONS_ACTIVE.dec();

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id(),
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process one frame. Returns false when the connection should close.
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            let event: ClientEvent = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    // Malformed payloads are rejected per-event; the
                    // connection stays open.
                    MALFORMED_EVENTS.inc();
                    tracing::warn!(
                        connection_id = %handle.id,
                        error = %e,
                        "Rejected malformed event payload"
                    );
                    let _ = handle
                        .send(ServerEvent::error("INVALID_EVENT", e.to_string()))
                        .await;
                    return true;
                }
            };

            state.router.dispatch(handle, event).await;
            true
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerEvent::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
