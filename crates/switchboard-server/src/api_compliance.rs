//! The observer WebSocket: push-only delivery of enriched transcription
//! events.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// WebSocket handler: `GET /compliance`.
pub async fn compliance_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer(socket, state))
}

async fn handle_observer(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(256);
    let id = state.observers.add(tx).await;
    let active = state.observers.count().await;
    tracing::info!(
        observer = %id,
        active = active,
        "compliance observer connected"
    );

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // The channel accepts no inbound semantics beyond connect/disconnect;
    // anything the observer sends is drained and ignored.
    while let Some(Ok(msg)) = receiver.next().await {
        if let AxumMessage::Close(_) = msg {
            break;
        }
    }

    state.observers.remove(id).await;
    send_task.abort();
    let active = state.observers.count().await;
    tracing::info!(
        observer = %id,
        active = active,
        "compliance observer disconnected"
    );
}
