//! Outbound frame delivery for one relay connection.

use switchboard_types::TextFrame;
use tokio::sync::mpsc;

/// Serializes outbound token frames onto a connection's bounded send
/// channel.
///
/// Delivery is best-effort: a closed or saturated channel means the
/// connection is gone or too slow, and the frame is dropped with a warning
/// rather than stalling the engine.
#[derive(Clone)]
pub struct RelaySink {
    tx: mpsc::Sender<String>,
}

impl RelaySink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    fn send_frame(&self, frame: &TextFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => {
                if let Err(e) = self.tx.try_send(json) {
                    tracing::warn!("dropping outbound frame for slow or closed connection: {e}");
                }
            }
            Err(e) => {
                tracing::error!("failed to serialize outbound frame: {e}");
            }
        }
    }

    /// Sends one non-terminal token.
    pub fn token(&self, token: &str) {
        self.send_frame(&TextFrame::partial(token));
    }

    /// Sends the terminal end-of-turn frame.
    pub fn end_turn(&self) {
        self.send_frame(&TextFrame::terminal());
    }

    /// Sends `text` as one complete assistant turn.
    pub fn speak(&self, text: &str) {
        self.token(text);
        self.end_turn();
    }
}
