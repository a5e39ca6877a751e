//! Trait seams between the core engines and the language model.

use crate::error::AiError;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use switchboard_types::{AnswerVerdict, ComplianceVerdict, Question, Turn};

/// A lazy sequence of generated text tokens.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, AiError>> + Send>>;

/// Streams assistant tokens for a free-form conversation.
#[async_trait]
pub trait ChatStream: Send + Sync {
    /// Starts generating a reply to the given conversation.
    ///
    /// The request itself may fail up front; once a stream is returned,
    /// individual items may still fail mid-stream.
    async fn stream_reply(&self, turns: &[Turn]) -> Result<TokenStream, AiError>;
}

/// Validates one raw questionnaire answer against one question.
#[async_trait]
pub trait AnswerValidator: Send + Sync {
    /// Returns the coerced verdict for `raw_answer`.
    ///
    /// Implementations guarantee the verdict's value shape matches the
    /// question kind (see [`crate::coerce_verdict`]); callers only need to
    /// distinguish valid from invalid.
    async fn validate_answer(
        &self,
        question: &Question,
        raw_answer: &str,
    ) -> Result<AnswerVerdict, AiError>;
}

/// Classifies a transcript snippet for policy-violation content.
#[async_trait]
pub trait TranscriptClassifier: Send + Sync {
    /// Classifies `transcript` using `context` (oldest-to-newest prior
    /// snippets from the same call) for disambiguation.
    async fn classify(
        &self,
        transcript: &str,
        context: &[String],
    ) -> Result<ComplianceVerdict, AiError>;
}
