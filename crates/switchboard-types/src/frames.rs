//! Wire frames for the relay WebSocket.
//!
//! Inbound frames arrive as JSON text from the telephony platform; outbound
//! frames carry spoken tokens back. Malformed input is never fatal: the
//! codec reports it and the connection keeps running.

use serde::{Deserialize, Serialize};

/// An inbound relay frame, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum RelayFrame {
    /// Binds the connection to a call and resets any prior state for it.
    #[serde(rename = "setup")]
    Setup {
        #[serde(rename = "callSid")]
        call_sid: String,
    },
    /// A finalized caller utterance.
    #[serde(rename = "prompt")]
    Prompt {
        #[serde(rename = "voicePrompt")]
        voice_prompt: String,
    },
    /// The caller started speaking over an assistant utterance; carries the
    /// prefix of that utterance the caller actually heard.
    #[serde(rename = "interrupt")]
    Interrupt {
        #[serde(rename = "utteranceUntilInterrupt")]
        utterance_until_interrupt: String,
    },
    /// A structurally valid frame with a `type` this server does not handle.
    #[serde(skip)]
    Unknown { kind: String },
}

impl RelayFrame {
    /// Parses one raw text frame.
    ///
    /// Returns `None` for malformed JSON (the caller logs and continues).
    /// JSON that carries an unrecognized `type`, or a recognized `type` with
    /// the wrong field shape, maps to [`RelayFrame::Unknown`] so the router
    /// can log it distinctly from transport garbage.
    pub fn parse(raw: &str) -> Option<RelayFrame> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        match serde_json::from_value::<RelayFrame>(value.clone()) {
            Ok(frame) => Some(frame),
            Err(_) => {
                let kind = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<missing>")
                    .to_string();
                Some(RelayFrame::Unknown { kind })
            }
        }
    }
}

/// An outbound token frame.
///
/// A logical assistant turn is zero or more `last: false` partials followed
/// by exactly one `last: true` terminal frame with an empty token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub token: String,
    pub last: bool,
}

impl TextFrame {
    /// A non-terminal partial token.
    pub fn partial(token: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            token: token.into(),
            last: false,
        }
    }

    /// The terminal end-of-turn frame.
    pub fn terminal() -> Self {
        Self {
            kind: "text".to_string(),
            token: String::new(),
            last: true,
        }
    }
}
