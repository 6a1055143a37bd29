//! Relay server - accepting signaling connections over WebSocket

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::any,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::envelope::{self, EnvelopeError};
use crate::registry::Registry;

/// Default listen address for the relay.
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:8765";

/// Outbound frames queued per endpoint before deliveries start dropping.
const OUTBOUND_QUEUE: usize = 100;

/// Shared relay state handed to each connection task.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<Registry>,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// The relay server: binds an address and serves the WebSocket endpoint.
pub struct RelayServer {
    addr: String,
    state: RelayState,
}

impl RelayServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            state: RelayState::new(),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.state.registry.clone()
    }

    /// Router serving the relay at `/`. Exposed so tests and embedders can
    /// bind their own listener.
    pub fn router(state: RelayState) -> Router {
        Router::new().route("/", any(ws_handler)).with_state(state)
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("failed to bind relay address {}", self.addr))?;
        info!("relay listening on {}", listener.local_addr()?);
        axum::serve(listener, Self::router(self.state))
            .await
            .context("relay server error")?;
        Ok(())
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a single endpoint connection.
///
/// Frames from this endpoint are consumed sequentially, so everything it
/// sends is broadcast in arrival order. The endpoint is unregistered on
/// every exit path before its socket halves are dropped.
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let id = state.registry.register(tx);

    // Writer task draining this endpoint's outbound queue
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    info!("endpoint {} connected", id);

    while let Some(result) = receiver.next().await {
        let frame = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("endpoint {} socket error: {}", id, e);
                break;
            }
        };

        match envelope::classify(&frame) {
            Ok(kind) => {
                let delivered = state.registry.broadcast(&frame, id);
                debug!(
                    "endpoint {} sent {} ({} bytes), delivered to {} peer(s)",
                    id,
                    kind,
                    frame.len(),
                    delivered
                );
            }
            Err(EnvelopeError::Unsupported(t)) => {
                trace!("endpoint {} sent unsupported type \"{}\", not relayed", id, t);
            }
            Err(e) => {
                warn!("endpoint {} sent malformed frame, dropped: {}", id, e);
            }
        }
    }

    state.registry.unregister(id);
    send_task.abort();
    info!("endpoint {} disconnected", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

    async fn spawn_relay() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = RelayState::new();
        tokio::spawn(async move {
            axum::serve(listener, RelayServer::router(state)).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        format!("ws://{}", addr)
    }

    type WsResult = Result<WsMessage, tokio_tungstenite::tungstenite::Error>;

    async fn recv_text(read: &mut (impl futures::Stream<Item = WsResult> + Unpin)) -> String {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .unwrap();
        msg.to_text().unwrap().to_string()
    }

    async fn assert_silent(read: &mut (impl futures::Stream<Item = WsResult> + Unpin)) {
        let res = tokio::time::timeout(Duration::from_millis(300), read.next()).await;
        assert!(res.is_err(), "expected no frame, got {:?}", res);
    }

    #[tokio::test]
    async fn offer_reaches_the_other_endpoint_verbatim() {
        let url = spawn_relay().await;

        let (ws_a, _) = connect_async(&url).await.unwrap();
        let (mut write_a, mut read_a) = ws_a.split();
        let (ws_b, _) = connect_async(&url).await.unwrap();
        let (_write_b, mut read_b) = ws_b.split();

        // extra fields must survive: the relay forwards raw frames
        let frame = r#"{"type":"offer","sdp":"X","session":"abc"}"#;
        write_a.send(WsMessage::Text(frame.to_string())).await.unwrap();

        assert_eq!(recv_text(&mut read_b).await, frame);
        assert_silent(&mut read_a).await;
    }

    #[tokio::test]
    async fn late_joiner_broadcasts_to_everyone_else() {
        let url = spawn_relay().await;

        let (ws_a, _) = connect_async(&url).await.unwrap();
        let (mut write_a, mut read_a) = ws_a.split();
        let (ws_b, _) = connect_async(&url).await.unwrap();
        let (_write_b, mut read_b) = ws_b.split();

        write_a
            .send(WsMessage::Text(r#"{"type":"offer","sdp":"X"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(recv_text(&mut read_b).await, r#"{"type":"offer","sdp":"X"}"#);

        let (ws_c, _) = connect_async(&url).await.unwrap();
        let (mut write_c, mut read_c) = ws_c.split();
        write_c
            .send(WsMessage::Text(r#"{"type":"candidate","sdp":"Y"}"#.to_string()))
            .await
            .unwrap();

        assert_eq!(recv_text(&mut read_a).await, r#"{"type":"candidate","sdp":"Y"}"#);
        assert_eq!(recv_text(&mut read_b).await, r#"{"type":"candidate","sdp":"Y"}"#);
        assert_silent(&mut read_c).await;
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_and_connection_survives() {
        let url = spawn_relay().await;

        let (ws_a, _) = connect_async(&url).await.unwrap();
        let (mut write_a, _read_a) = ws_a.split();
        let (ws_b, _) = connect_async(&url).await.unwrap();
        let (_write_b, mut read_b) = ws_b.split();

        write_a
            .send(WsMessage::Text("not-json".to_string()))
            .await
            .unwrap();
        assert_silent(&mut read_b).await;

        // same connection keeps working afterwards
        write_a
            .send(WsMessage::Text(r#"{"type":"answer","sdp":"Z"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(recv_text(&mut read_b).await, r#"{"type":"answer","sdp":"Z"}"#);
    }

    #[tokio::test]
    async fn unsupported_types_are_not_relayed() {
        let url = spawn_relay().await;

        let (ws_a, _) = connect_async(&url).await.unwrap();
        let (mut write_a, _read_a) = ws_a.split();
        let (ws_b, _) = connect_async(&url).await.unwrap();
        let (_write_b, mut read_b) = ws_b.split();

        write_a
            .send(WsMessage::Text(r#"{"type":"hello","sdp":"X"}"#.to_string()))
            .await
            .unwrap();
        assert_silent(&mut read_b).await;
    }

    #[tokio::test]
    async fn disconnected_endpoint_is_unregistered() {
        let url = spawn_relay().await;

        let (ws_a, _) = connect_async(&url).await.unwrap();
        let (mut write_a, mut read_a) = ws_a.split();
        let (ws_b, _) = connect_async(&url).await.unwrap();
        drop(ws_b);
        tokio::time::sleep(Duration::from_millis(100)).await;

        write_a
            .send(WsMessage::Text(r#"{"type":"offer","sdp":"X"}"#.to_string()))
            .await
            .unwrap();
        // nothing left to deliver to, and the relay stays up
        assert_silent(&mut read_a).await;

        write_a
            .send(WsMessage::Text(r#"{"type":"offer","sdp":"X"}"#.to_string()))
            .await
            .unwrap();
        assert_silent(&mut read_a).await;
    }
}
