//! axum WebSocket transport
//!
//! Each connection gets a bounded channel and a writer task; the manager only
//! ever sees the [`ChannelSocket`] end, so a slow browser fills its own
//! buffer instead of stalling a broadcast. Removal by the manager cancels the
//! connection's token, which ends the read loop as well as the writer.

use super::client::{ChannelSocket, OutboundFrame};
use super::manager::{BroadcastManager, BroadcastStats};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long the writer gets to flush the close frame
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Router with the WebSocket endpoint at `ws_path` and a `/health` route
pub fn status_router(manager: BroadcastManager, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(manager)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<BroadcastManager>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, manager))
}

async fn health_handler(State(manager): State<BroadcastManager>) -> Json<BroadcastStats> {
    Json(manager.stats())
}

async fn handle_socket(socket: WebSocket, manager: BroadcastManager) {
    let (mut sink, mut stream) = socket.split();
    let (channel, mut outbound) = ChannelSocket::channel(manager.config().client_buffer);
    let closed = outbound.closed_token();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let (message, last) = match frame {
                OutboundFrame::Text(text) => (Message::Text(text), false),
                OutboundFrame::Ping => (Message::Ping(Vec::new()), false),
                OutboundFrame::Close(code, reason) => (
                    Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })),
                    true,
                ),
            };
            if sink.send(message).await.is_err() || last {
                break;
            }
        }
    });

    // rejected connections are closed through the channel by the manager
    let Some(client_id) = manager.register_client(Arc::new(channel)) else {
        let _ = writer.await;
        return;
    };

    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => {
                debug!(client_id = %client_id, "Connection closed by server");
                break;
            }
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => manager.handle_client_message(&client_id, &text),
            Some(Ok(Message::Close(_))) | None => {
                debug!(client_id = %client_id, "Client closed connection");
                break;
            }
            Some(Ok(_)) => manager.record_heartbeat(&client_id),
            Some(Err(e)) => {
                warn!(client_id = %client_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    manager.remove_client(&client_id);
    // let the writer deliver the close frame to a browser that is still there
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
}
