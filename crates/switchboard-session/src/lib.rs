//! Per-call session protocol state machines.
//!
//! This crate is the heart of the relay: it owns every live call's state and
//! drives it from inbound relay frames to outbound spoken frames and, at the
//! end, to the single persisted call record.
//!
//! Two engines cover the two call styles. The [`QuestionnaireEngine`] walks
//! a fixed ordered question list with per-answer validation, a retry
//! ceiling, and a silence watchdog; the [`ConversationEngine`] maintains a
//! free-form transcript, streams model tokens to the caller, and truncates
//! the transcript when the caller interrupts. Both terminate through the
//! idempotent [`CallTerminator`], which persists the outcome *before*
//! touching the call-control sink so a sink failure can never lose answers.
//!
//! Concurrency model: each connection processes its frames strictly in
//! arrival order on one task, so per-session mutation is naturally
//! serialized. The cross-call registries are shared and lock-guarded; the
//! silence watchdog runs on its own task and is fenced by the session's
//! terminal latch plus a watchdog epoch, closing the cancel/fire race.

mod conversation;
mod questionnaire;
mod registry;
mod sink;
mod terminator;
mod watchdog;

pub use conversation::ConversationEngine;
pub use questionnaire::{
    QuestionnaireEngine, COMPLETION_MESSAGE, INVALID_ANSWERS_MESSAGE, SILENCE_MESSAGE,
};
pub use registry::{ConversationRegistry, SessionRegistry, SessionSnapshot};
pub use sink::RelaySink;
pub use terminator::CallTerminator;
pub use watchdog::SilenceWatchdog;

use thiserror::Error;

/// Errors surfaced by session finalization.
///
/// Only persistence problems propagate: losing a questionnaire outcome is
/// the one failure the engines are not allowed to swallow. Call-control sink
/// failures are logged inside the terminator and never raised.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Writing the call record failed.
    #[error("failed to persist record for call {call_sid}: {source}")]
    Store {
        call_sid: String,
        #[source]
        source: switchboard_db::StoreError,
    },

    /// The blocking persistence task was cancelled or panicked.
    #[error("persistence task failed for call {call_sid}: {reason}")]
    StoreTask { call_sid: String, reason: String },
}
