//! WebSocket endpoints `/ws/blocks` and `/ws/gas`.
//!
//! The connection registers with the hub before the upgrade completes, so a
//! full hub answers 503 instead of accepting and closing. After the upgrade
//! the socket is split: the read half only watches for the client leaving,
//! the write half is the subscriber's event sink.

use crate::domain::error::ApiError;
use crate::domain::types::WsEvent;
use crate::router::AppState;
use crate::ws::hub::{Registration, Topic};
use crate::ws::watcher::{run_subscriber, EventSink, SinkError};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// `GET /ws/blocks`
pub async fn ws_blocks(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, state, Topic::Blocks)
}

/// `GET /ws/gas`
pub async fn ws_gas(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, state, Topic::Gas)
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, topic: Topic) -> Response {
    let registration = match state.hub.register(topic) {
        Ok(registration) => registration,
        Err(e) => {
            state.metrics.record_ws_rejected();
            warn!(topic = %topic, error = %e, "Rejecting WebSocket upgrade");
            return ApiError::unavailable(e.to_string()).into_response();
        }
    };
    ws.on_upgrade(move |socket| serve_socket(socket, state, registration))
}

/// Write half of a socket as an [`EventSink`]
pub struct SocketSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl EventSink for SocketSink {
    async fn send(&mut self, event: &WsEvent) -> Result<(), SinkError> {
        let text = serde_json::to_string(event).map_err(|e| SinkError(e.to_string()))?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// Drain client frames until close or error, then signal.
async fn watch_client(mut receiver: SplitStream<WebSocket>, gone: oneshot::Sender<()>) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            // Pings are answered by axum; other client input is ignored
            Ok(_) => {}
        }
    }
    let _ = gone.send(());
}

async fn serve_socket(socket: WebSocket, state: AppState, registration: Registration) {
    let subscriber_id = registration.id();
    let topic = registration.topic();
    registration.activate();
    state.metrics.record_ws_connect();
    info!(subscriber_id = %subscriber_id, topic = %topic, "Subscriber connected");

    let (sender, receiver) = socket.split();
    let mut sink = SocketSink { sender };

    let (gone_tx, gone_rx) = oneshot::channel();
    let reader = tokio::spawn(watch_client(receiver, gone_tx));

    let mut shutdown = state.hub.shutdown_signal();
    let cancel = async move {
        tokio::select! {
            _ = gone_rx => {}
            _ = shutdown.wait() => {}
        }
    };

    let outcome = run_subscriber(&state.watch, &registration, &mut sink, cancel).await;

    reader.abort();
    let _ = sink.sender.close().await;
    state.metrics.record_ws_disconnect();
    info!(subscriber_id = %subscriber_id, topic = %topic, outcome = ?outcome, "Subscriber finished");
    registration.finish(outcome);
}
