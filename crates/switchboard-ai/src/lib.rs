//! The AI Response Source for the Switchboard platform.
//!
//! Three narrow contracts cover everything the rest of the system needs
//! from a language model: a lazy token stream for free-form chat
//! ([`ChatStream`]), a single validation verdict for a structured
//! questionnaire answer ([`AnswerValidator`]), and a single compliance
//! classification verdict for a transcript snippet
//! ([`TranscriptClassifier`]). All three are implemented by
//! [`OpenAiClient`] against an OpenAI-compatible HTTP API; tests substitute
//! scripted fakes.
//!
//! The model is a black box that may fail: every error here is expected to
//! be caught at the call site and converted to a local fallback.

mod client;
mod error;
mod source;
mod sse;
mod verdict;

pub use client::{OpenAiClient, OpenAiConfig};
pub use error::AiError;
pub use source::{AnswerValidator, ChatStream, TokenStream, TranscriptClassifier};
pub use sse::SseLineParser;
pub use verdict::{coerce_verdict, parse_compliance_verdict};
