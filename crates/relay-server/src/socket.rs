//! WebSocket transport. Each accepted socket gets a connection id, a
//! [`WsSink`] the dispatcher writes to, and a read loop that feeds the
//! packet router one frame at a time.

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use relay_core::{Packet, RelayError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::dispatch::PacketSink;
use crate::relay::{Connection, Relay};

/// Write half of a WebSocket.
pub struct WsSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsSink {
    fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Mutex::new(sender),
            closed: AtomicBool::new(false),
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PacketSink for WsSink {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::SocketClosed);
        }
        let text = packet.to_json()?;
        self.sender
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RelayError::Send(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// `GET /socket`: upgrade to a relay socket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let relay = Arc::clone(&state.relay);
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let id = relay.next_connection_id();
    let (sender, mut receiver) = socket.split();
    let sink = Arc::new(WsSink::new(sender));
    let conn = Connection::new(id, sink.clone());
    info!(connection = id, "socket connected");

    // Frames are routed one at a time, so per-socket order is preserved.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => relay.route(&conn, text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => relay.route(&conn, text),
                Err(_) => {
                    relay.metrics().inc_packets_rejected();
                    warn!(connection = id, len = bytes.len(), "discarding non-UTF-8 binary frame");
                }
            },
            Ok(Message::Close(_)) => {
                debug!(connection = id, "client sent close frame");
                break;
            }
            // Pong replies are sent by axum
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!(connection = id, error = %e, "socket receive error");
                break;
            }
        }
    }

    sink.mark_closed();
    relay.disconnect(id);
}
