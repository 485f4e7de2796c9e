//! The `/ws` axum endpoint: upgrades an HTTP request into a WebSocket
//! connection, then loops forwarding the hub's per-client mailbox into the
//! socket while draining client frames (ping/pong/text) back into the hub
//! (spec §4.7, §6 wire protocol).
//!
//! Grounded in the same `WebSocketUpgrade` + split-sink/split-stream +
//! `tokio::select!` shape the pack's own push-based socket handler uses,
//! generalized from a single periodic snapshot push to draining a
//! per-client mpsc mailbox the hub's `broadcast` writes into.

use crate::hub::{note_activity, send_with_timeout, Hub};
use crate::messages::{ErrorMessage, PongMessage};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Optional query parameters accepted on `/ws` (spec §6). `client_id` is a
/// caller-supplied hint logged for correlation; the hub always assigns its
/// own UUID as the authoritative identifier (spec §4.7 `accept`).
#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    client_id: Option<String>,
}

/// Builds the axum router exposing the single `/ws` endpoint over `hub`.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(hub)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if let Some(hint) = &query.client_id {
        debug!(hint = %hint, "websocket upgrade requested");
    }
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

async fn handle_connection(socket: WebSocket, hub: Arc<Hub>) {
    let accepted = match hub.accept() {
        Ok(accepted) => accepted,
        Err(err) => {
            warn!(%err, "websocket connection rejected");
            let _ = send_reject(socket, err.to_string()).await;
            return;
        }
    };

    info!(client_id = %accepted.client_id, "websocket connection accepted");
    let client_id = accepted.client_id.clone();
    let mut outbox = accepted.outbox;
    let last_pong = accepted.last_pong;

    let (mut sender, mut receiver) = socket.split();
    let mut ping_interval = tokio::time::interval(hub.ping_interval());
    ping_interval.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            queued = outbox.recv() => {
                match queued {
                    Some(payload) => {
                        if send_with_timeout(sender.send(Message::Text(payload.into()))).await.is_err() {
                            break;
                        }
                    }
                    None => break, // hub closed this client's mailbox
                }
            }

            _ = ping_interval.tick() => {
                if send_with_timeout(sender.send(Message::Ping(Vec::new().into()))).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        note_activity(&last_pong);
                        if text.trim() == "{\"type\":\"ping\"}" || text.contains("\"ping\"") {
                            let pong = serde_json::to_string(&PongMessage::default())
                                .unwrap_or_else(|_| "{\"type\":\"pong\"}".to_string());
                            if send_with_timeout(sender.send(Message::Text(pong.into()))).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        note_activity(&last_pong);
                        if send_with_timeout(sender.send(Message::Pong(data))).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        note_activity(&last_pong);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(client_id = %client_id, "websocket close frame received");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Binary frames are outside the JSON-text protocol; ignored.
                    }
                    Some(Err(err)) => {
                        debug!(client_id = %client_id, %err, "websocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    hub.close(&client_id);
}

async fn send_reject(mut socket: WebSocket, reason: String) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(&ErrorMessage::new(reason))
        .unwrap_or_else(|_| "{\"type\":\"error\"}".to_string());
    let _ = send_with_timeout(socket.send(Message::Text(payload.into()))).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), socket.close()).await;
    Ok(())
}
