//! The relay WebSocket: the duplex session channel with the telephony
//! platform.
//!
//! One task owns each connection and processes its frames strictly in
//! arrival order, so all of a call's session mutations are naturally
//! serialized. A setup frame binds the connection to a call identifier for
//! the rest of its lifetime; prompts and interrupts before setup are
//! logged and dropped.

use crate::config::RelayMode;
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
use switchboard_session::RelaySink;
use switchboard_types::RelayFrame;
use tokio::sync::mpsc;

/// WebSocket handler: `GET /ws`.
pub async fn relay_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded channel per connection so a slow platform cannot grow memory
    // without limit; the engines drop frames past that point.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let sink = RelaySink::new(tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut call_sid: Option<String> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => {
                let Some(frame) = RelayFrame::parse(&text) else {
                    tracing::warn!("malformed relay frame dropped");
                    continue;
                };

                match frame {
                    RelayFrame::Setup { call_sid: sid } => {
                        let sid = sid.trim().to_string();
                        if sid.is_empty() {
                            tracing::warn!("setup frame missing callSid");
                            continue;
                        }
                        match state.mode {
                            RelayMode::Questionnaire => {
                                state.questionnaire.on_setup(&sid, &sink).await;
                            }
                            RelayMode::Conversation => {
                                state.conversation.on_setup(&sid).await;
                            }
                        }
                        call_sid = Some(sid);
                    }
                    RelayFrame::Prompt { voice_prompt } => {
                        let Some(sid) = call_sid.as_deref() else {
                            tracing::warn!("prompt received before setup");
                            continue;
                        };
                        match state.mode {
                            RelayMode::Questionnaire => {
                                state.questionnaire.on_prompt(sid, &voice_prompt, &sink).await;
                            }
                            RelayMode::Conversation => {
                                state.conversation.on_prompt(sid, &voice_prompt, &sink).await;
                            }
                        }
                    }
                    RelayFrame::Interrupt {
                        utterance_until_interrupt,
                    } => {
                        let Some(sid) = call_sid.as_deref() else {
                            tracing::warn!("interrupt received before setup");
                            continue;
                        };
                        match state.mode {
                            RelayMode::Questionnaire => {
                                state
                                    .questionnaire
                                    .on_interrupt(sid, &utterance_until_interrupt)
                                    .await;
                            }
                            RelayMode::Conversation => {
                                state
                                    .conversation
                                    .on_interrupt(sid, &utterance_until_interrupt)
                                    .await;
                            }
                        }
                    }
                    RelayFrame::Unknown { kind } => {
                        tracing::warn!(kind = %kind, "unknown relay frame type ignored");
                    }
                }
            }
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    if let Some(sid) = call_sid {
        match state.mode {
            RelayMode::Questionnaire => state.questionnaire.on_disconnect(&sid).await,
            RelayMode::Conversation => state.conversation.on_disconnect(&sid).await,
        }
        tracing::info!(call_sid = %sid, "relay connection closed");
    }
    send_task.abort();
}
