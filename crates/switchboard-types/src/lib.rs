//! Shared types and constants for the Switchboard platform.
//!
//! This crate provides the foundational types used across all Switchboard
//! crates: the questionnaire model, answer values and verdicts, session
//! status, relay wire frames, and transcription webhook payloads.
//!
//! No crate in the workspace depends on anything *except* `switchboard-types`
//! for cross-cutting type definitions. This keeps the dependency graph clean
//! and prevents circular dependencies.

mod frames;
mod question;
mod webhook;

pub use frames::{RelayFrame, TextFrame};
pub use question::{KnownCompanyPolicy, MatchPolicy, Question, QuestionKind};
pub use webhook::TranscriptionPayload;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a questionnaire session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The caller is still answering questions.
    InProgress,
    /// Every question received a valid answer.
    Completed,
    /// The call was ended early (retry ceiling or silence).
    Terminated,
}

impl SessionStatus {
    /// Returns the wire label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
        }
    }
}

/// Why a session reached a terminal state. Empty while in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Session is still live; serialized as the empty string.
    #[default]
    #[serde(rename = "")]
    None,
    /// All questions answered.
    Completed,
    /// Three consecutive invalid answers on one question.
    InvalidAnswers,
    /// The silence watchdog fired.
    Silence,
}

impl TerminationReason {
    /// Returns the wire label for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Completed => "completed",
            Self::InvalidAnswers => "invalid_answers",
            Self::Silence => "silence",
        }
    }
}

/// A normalized questionnaire answer.
///
/// The shape depends on the question kind: `name`, `yes_no` and `topic_text`
/// answers normalize to text (`yes_no` to the literal `"yes"` or `"no"`),
/// `scale_1_10` to an integer, and `topic_entity` to a [`CompanyEntity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Free text or a yes/no literal.
    Text(String),
    /// A 1–10 scale rating.
    Integer(i64),
    /// An extracted company entity.
    Entity(CompanyEntity),
}

/// A company extracted from a `topic_entity` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyEntity {
    /// The extracted company name.
    pub name: String,
    /// Whether the name matched the configured allow-list.
    #[serde(rename = "isKnown")]
    pub is_known: bool,
}

/// Outcome of validating one raw answer against one question.
///
/// Produced by the AI Response Source boundary after shape coercion; the
/// questionnaire engine only ever sees one of these two arms.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerVerdict {
    /// The answer was accepted; `value` is the normalized form to store.
    Valid(AnswerValue),
    /// The answer was rejected; `feedback` is an optional spoken hint.
    Invalid { feedback: Option<String> },
}

/// Outcome of classifying a transcript snippet for policy violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    /// Whether the snippet (in context) violates policy.
    pub violation: bool,
    /// The specific phrases the classifier flagged.
    pub phrases: Vec<String>,
}

/// A single turn in a free-form conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Speaker role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// The single persisted record for one call.
///
/// Exactly one of these exists per call identifier; every finalize overwrites
/// it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_sid: String,
    /// Question id → normalized answer.
    pub answers: BTreeMap<String, AnswerValue>,
    pub status: SessionStatus,
    pub termination_reason: TerminationReason,
}
