//! Subscription endpoint: one websocket per forwarding client.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::hub::{EventSink, HubHandle, SinkError};

use super::AppState;

/// Write half of a subscriber websocket.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WsSink {
    pub const fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EventSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), SinkError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            debug!(error = %e, "Close frame not sent");
        }
        let _ = self.inner.close().await;
    }
}

/// `GET /ws/{service}`: upgrade and subscribe to `service`.
pub async fn subscribe(
    ws: WebSocketUpgrade,
    Path(service): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, service, state.hub))
}

/// Register the socket, then read until the peer goes away.
///
/// Subscribers never send data; the read side only detects closure.
async fn serve_subscriber(socket: WebSocket, channel: String, hub: HubHandle) {
    let (sink, mut stream) = socket.split();
    let subscriber = match hub.register(&channel, WsSink::new(sink)).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            warn!(channel = %channel, error = %e, "Could not register websocket subscriber");
            return;
        }
    };
    let connection_id = subscriber.id();
    info!(channel = %channel, connection_id = %connection_id, "New websocket connection");

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(frame)) => {
                debug!(
                    connection_id = %connection_id,
                    code = ?frame.as_ref().map(|f| f.code),
                    "Peer closed websocket"
                );
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Unexpected websocket close");
                break;
            }
        }
    }

    let _ = hub.unregister(connection_id).await;
    subscriber.close().await;
    info!(channel = %channel, connection_id = %connection_id, "Websocket connection closed");
}
