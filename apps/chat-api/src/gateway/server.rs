//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use minitalk_common::id::{prefix, prefixed_ulid};

use crate::AppState;

use super::events::{ClientFrame, ServerEvent};

/// Close code for frames that are not valid JSON (4000-range: application-level).
const CLOSE_INVALID_JSON: u16 = 4000;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Drive one connection from upgrade to disconnect.
///
/// Inbound frames go to the hub in arrival order; everything the hub queues
/// for this connection is written out by the same loop.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = prefixed_ulid(prefix::CONNECTION);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut outbound = state
        .hub
        .connect(&connection_id, || state.connections.open(&connection_id));
    tracing::info!(%connection_id, "connection opened");

    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame: ClientFrame = match serde_json::from_str(&text) {
                            Ok(f) => f,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_INVALID_JSON, "Invalid JSON").await;
                                break;
                            }
                        };
                        state.hub.dispatch(&connection_id, frame);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %connection_id, "ws read error");
                        break;
                    }
                    // Ping/pong are answered by the protocol layer; binary frames are ignored.
                    Some(Ok(_)) => continue,
                }
            }

            // Event queued by the hub for this connection.
            frame = outbound.recv() => {
                let Some(event) = frame else { break };
                if send_event(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    state.connections.close(&connection_id);
    state.hub.disconnect(&connection_id);
    tracing::info!(%connection_id, "connection closed");
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(?err, event = event.name(), "failed to encode event");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
