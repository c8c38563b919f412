//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the subscriber lifecycle.
//! Subscribers only receive; incoming text is ignored.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::hub::RelayHub;
use super::messages::ServerMessage;
use crate::api::AppState;

/// Close code sent when the relay is going away (RFC 6455 1001)
const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code sent when the subscriber cannot be admitted (RFC 6455 1013)
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Per-connection settings taken from the API config
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    buffer: usize,
    write_timeout: Duration,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, &state)
}

/// Upgrade the connection and hand it to the subscriber loop
pub(crate) fn upgrade(ws: WebSocketUpgrade, state: &AppState) -> Response {
    let hub = Arc::clone(&state.hub);
    let shutdown = state.shutdown.clone();
    let settings = ConnectionSettings {
        buffer: state.config.subscriber_buffer.max(1),
        write_timeout: state.config.write_timeout,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, hub, shutdown, settings))
}

/// Handle an established subscriber connection
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<RelayHub>,
    shutdown: CancellationToken,
    settings: ConnectionSettings,
) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded queue between the hub and this connection's writer
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(settings.buffer);

    let connection_id = match hub.register(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected subscriber");
            let _ = sender
                .send(close_message(CLOSE_TRY_AGAIN_LATER, &e.to_string()))
                .await;
            return;
        }
    };

    let conn_id_for_send = connection_id.clone();
    let shutdown_for_send = shutdown.clone();

    // Task to forward queued messages to the socket
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => msg,
                _ = shutdown_for_send.cancelled() => None,
            };

            let Some(msg) = msg else {
                // Hub dropped us or the relay is stopping
                let close = close_message(CLOSE_GOING_AWAY, "relay shutting down");
                let _ = tokio::time::timeout(settings.write_timeout, sender.send(close)).await;
                break;
            };

            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            match tokio::time::timeout(settings.write_timeout, sender.send(Message::Text(text))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(connection_id = %conn_id_for_send, error = %e, "WebSocket send failed, closing connection");
                    break;
                }
                Err(_) => {
                    tracing::debug!(connection_id = %conn_id_for_send, "WebSocket send timed out, closing connection");
                    break;
                }
            }
        }
    });

    let conn_id_for_recv = connection_id.clone();

    // Task to watch the socket for close and errors
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %conn_id_for_recv, "Client requested close");
                    break;
                }
                Ok(Message::Text(text)) => {
                    tracing::trace!(connection_id = %conn_id_for_recv, len = text.len(), "Ignoring client message");
                }
                // Axum answers pings itself
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    // Cleanup: unregister from hub
    hub.unregister(&connection_id).await;
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}
