//! The free-form conversation engine.
//!
//! Keeps an ordered transcript per call, streams model tokens back to the
//! transport as partial frames, and rewrites history when the caller
//! interrupts: the interrupted assistant turn is cut at exactly the point
//! the caller stopped hearing it, and any assistant turns generated after
//! it are dropped as stale continuations.

use std::sync::Arc;

use futures_util::StreamExt;
use switchboard_ai::ChatStream;
use switchboard_types::{Role, Turn};

use crate::registry::ConversationRegistry;
use crate::sink::RelaySink;

/// Spoken (and recorded) when generation fails before or during streaming.
const GENERATION_FALLBACK: &str = "I ran into a temporary issue while generating a response.";

/// Recorded when the model streamed nothing usable.
const EMPTY_RESPONSE: &str = "I am sorry, I could not generate a response.";

pub struct ConversationEngine {
    conversations: ConversationRegistry,
    chat: Arc<dyn ChatStream>,
    system_prompt: String,
}

impl ConversationEngine {
    pub fn new(
        conversations: ConversationRegistry,
        chat: Arc<dyn ChatStream>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            chat,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn conversations(&self) -> &ConversationRegistry {
        &self.conversations
    }

    /// Resets the conversation to a single system turn.
    pub async fn on_setup(&self, call_sid: &str) {
        self.conversations
            .create(call_sid, &self.system_prompt)
            .await;
        tracing::info!(call_sid = %call_sid, "conversation started");
    }

    /// Appends the caller's turn, streams the reply, and records the
    /// assistant turn.
    ///
    /// The caller must never see a stream that silently stops: a failure
    /// before or during generation substitutes one fixed fallback sentence
    /// as the only emitted token, and the terminal frame is always sent.
    pub async fn on_prompt(&self, call_sid: &str, text: &str, sink: &RelaySink) {
        let text = text.trim();
        if text.is_empty() {
            tracing::warn!(call_sid = %call_sid, "prompt message carried no text");
            return;
        }

        let turns = self
            .conversations
            .with_conversation(call_sid, &self.system_prompt, |turns| {
                turns.push(Turn::user(text));
                turns.clone()
            })
            .await;

        let mut segments: Vec<String> = Vec::new();
        match self.chat.stream_reply(&turns).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(token) => {
                            sink.token(&token);
                            segments.push(token);
                        }
                        Err(e) => {
                            tracing::warn!(call_sid = %call_sid, "token stream failed mid-reply: {e}");
                            segments = vec![GENERATION_FALLBACK.to_string()];
                            sink.token(GENERATION_FALLBACK);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(call_sid = %call_sid, "reply generation failed: {e}");
                segments = vec![GENERATION_FALLBACK.to_string()];
                sink.token(GENERATION_FALLBACK);
            }
        }
        sink.end_turn();

        let mut response = segments.concat().trim().to_string();
        if response.is_empty() {
            response = EMPTY_RESPONSE.to_string();
        }

        self.conversations
            .with_conversation(call_sid, &self.system_prompt, |turns| {
                turns.push(Turn::assistant(response));
            })
            .await;
        tracing::info!(call_sid = %call_sid, "assistant turn recorded");
    }

    /// Truncates history at the point the caller interrupted.
    pub async fn on_interrupt(&self, call_sid: &str, utterance: &str) {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            tracing::info!(call_sid = %call_sid, "interrupt without utterance payload");
            return;
        }

        let truncated = self
            .conversations
            .with_existing(call_sid, |turns| truncate_at_utterance(turns, utterance))
            .await;

        match truncated {
            None => tracing::info!(call_sid = %call_sid, "interrupt for unknown conversation"),
            Some(false) => {
                tracing::info!(call_sid = %call_sid, "no assistant turn matched the interrupt utterance")
            }
            Some(true) => tracing::info!(call_sid = %call_sid, "interrupt truncation applied"),
        }
    }

    /// Drops the transcript when the connection goes away.
    pub async fn on_disconnect(&self, call_sid: &str) {
        self.conversations.remove(call_sid).await;
        tracing::info!(call_sid = %call_sid, "conversation cleaned up");
    }
}

/// Scans backwards for the most recent assistant turn containing
/// `utterance`, truncates it to end exactly at the end of the match, and
/// drops every later assistant turn. Returns `false` (leaving the turns
/// untouched) when nothing matches; the engine never guesses a truncation
/// point.
fn truncate_at_utterance(turns: &mut Vec<Turn>, utterance: &str) -> bool {
    let Some(index) = turns
        .iter()
        .rposition(|t| t.role == Role::Assistant && t.content.contains(utterance))
    else {
        return false;
    };

    if let Some(position) = turns[index].content.find(utterance) {
        turns[index].content.truncate(position + utterance.len());
    }

    let mut current = 0;
    turns.retain(|turn| {
        let i = current;
        current += 1;
        i <= index || turn.role != Role::Assistant
    });

    true
}
