//! Transcription webhook payloads.
//!
//! The telephony platform delivers transcription callbacks either
//! form-encoded or as JSON; by the time a payload reaches this type it is a
//! flat JSON object. Field accessors tolerate the quirks the platform
//! actually exhibits: string booleans, and `TranscriptionData` arriving
//! either pre-decoded or as nested serialized JSON text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event kind label for speech content updates.
pub const EVENT_TRANSCRIPTION_CONTENT: &str = "transcription-content";

/// Track label for caller-side audio.
pub const TRACK_INBOUND: &str = "inbound_track";

/// One transcription (or summary) webhook payload.
///
/// Wraps the raw field map so unrecognized fields survive untouched into the
/// fan-out broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscriptionPayload(pub Map<String, Value>);

impl TranscriptionPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// The event kind, e.g. `transcription-content`.
    pub fn event(&self) -> Option<&str> {
        self.str_field("TranscriptionEvent")
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.str_field("CallSid")
    }

    pub fn track(&self) -> Option<&str> {
        self.str_field("Track")
    }

    /// Whether this is a speech content update (vs. start/stop/summary).
    pub fn is_content(&self) -> bool {
        self.event() == Some(EVENT_TRANSCRIPTION_CONTENT)
    }

    /// Whether the event is on the caller-side audio track.
    pub fn is_inbound_track(&self) -> bool {
        self.track() == Some(TRACK_INBOUND)
    }

    /// Whether the transcript is final.
    ///
    /// The platform sends `Final` as a string; anything other than an
    /// explicit `"false"` counts as final, matching its resend behavior.
    pub fn is_final(&self) -> bool {
        match self.0.get("Final") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.eq_ignore_ascii_case("false"),
            _ => true,
        }
    }

    /// Extracts the transcript text from `TranscriptionData`.
    ///
    /// The field may be a decoded object, a JSON object serialized as text,
    /// or plain text. Returns an empty string when absent.
    pub fn transcript(&self) -> String {
        let Some(data) = self.0.get("TranscriptionData") else {
            return String::new();
        };

        match data {
            Value::Object(map) => map
                .get("transcript")
                .map(value_to_text)
                .unwrap_or_default(),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map
                    .get("transcript")
                    .map(value_to_text)
                    .unwrap_or_default(),
                Ok(other) => value_to_text(&other),
                Err(_) => text.clone(),
            },
            other => value_to_text(other),
        }
    }

    /// Attaches the classification outcome, yielding the enriched fan-out
    /// payload.
    pub fn enriched(mut self, violation: bool, phrases: &[String]) -> Self {
        self.0.insert("violation".to_string(), Value::Bool(violation));
        self.0.insert(
            "violation_phrases".to_string(),
            Value::Array(phrases.iter().map(|p| Value::String(p.clone())).collect()),
        );
        self
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
