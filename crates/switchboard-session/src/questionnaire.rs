//! The structured questionnaire state machine.
//!
//! Walks a fixed ordered question list: each prompt from the caller is
//! validated against the current question, invalid answers are retried up
//! to a ceiling, and the session finalizes as completed (all questions
//! answered), terminated with `invalid_answers` (ceiling reached), or
//! terminated with `silence` (watchdog fired). Terminal states are
//! absorbing; only a fresh setup on the same identifier starts over.

use std::sync::Arc;
use std::time::Duration;

use switchboard_ai::AnswerValidator;
use switchboard_types::{AnswerValue, AnswerVerdict, Question, SessionStatus, TerminationReason};

use crate::registry::SessionRegistry;
use crate::sink::RelaySink;
use crate::terminator::CallTerminator;
use crate::watchdog::SilenceWatchdog;

/// Consecutive invalid answers on one question before the call terminates.
const MAX_INVALID_ATTEMPTS: u32 = 3;

/// Spoken when the final question receives a valid answer.
pub const COMPLETION_MESSAGE: &str =
    "That was the last question. Thank you for your time. Goodbye.";

/// Spoken when the retry ceiling is reached.
pub const INVALID_ANSWERS_MESSAGE: &str =
    "I am sorry, I was not able to understand your answers. Let us try again another time. Goodbye.";

/// Spoken by the watchdog when the caller goes silent.
pub const SILENCE_MESSAGE: &str =
    "I have not heard anything for a while, so I will end the call now. Goodbye.";

/// Spoken before re-asking when the validator itself failed.
const VALIDATOR_ERROR_MESSAGE: &str =
    "I ran into a temporary issue checking your answer. Let us try that once more.";

/// Spoken before re-asking when the answer was invalid and the validator
/// offered no feedback of its own.
const RETRY_FALLBACK: &str = "I did not quite catch that.";

pub struct QuestionnaireEngine {
    registry: SessionRegistry,
    validator: Arc<dyn AnswerValidator>,
    terminator: Arc<CallTerminator>,
    watchdog: SilenceWatchdog,
    questions: Arc<Vec<Question>>,
}

impl QuestionnaireEngine {
    pub fn new(
        registry: SessionRegistry,
        validator: Arc<dyn AnswerValidator>,
        terminator: Arc<CallTerminator>,
        questions: Vec<Question>,
        silence_timeout: Duration,
    ) -> Self {
        let watchdog = SilenceWatchdog::new(
            registry.clone(),
            terminator.clone(),
            silence_timeout,
            SILENCE_MESSAGE,
        );
        Self {
            registry,
            validator,
            terminator,
            watchdog,
            questions: Arc::new(questions),
        }
    }

    /// Creates a fresh session (discarding any prior state for the call),
    /// speaks the first question, and arms the watchdog.
    pub async fn on_setup(&self, call_sid: &str, sink: &RelaySink) {
        self.registry.create(call_sid).await;
        tracing::info!(call_sid = %call_sid, "questionnaire session started");

        match self.questions.first() {
            Some(first) => {
                sink.speak(&first.prompt);
                self.watchdog.start(call_sid).await;
            }
            None => {
                // An empty questionnaire has nothing to ask.
                self.finalize_logged(
                    call_sid,
                    COMPLETION_MESSAGE,
                    SessionStatus::Completed,
                    TerminationReason::Completed,
                )
                .await;
            }
        }
    }

    /// Advances the questionnaire with the caller's answer to the current
    /// question.
    pub async fn on_prompt(&self, call_sid: &str, raw_answer: &str, sink: &RelaySink) {
        let raw_answer = raw_answer.trim();
        if raw_answer.is_empty() {
            tracing::warn!(call_sid = %call_sid, "prompt message carried no text");
            return;
        }

        // Receiving a prompt always resets the timeout clock, and any answer
        // against a missing or finished session is a guarded no-op.
        let index = self
            .registry
            .with_live_session(call_sid, |session| {
                session.abort_watchdog();
                session.question_index
            })
            .await;
        let Some(index) = index else {
            tracing::warn!(call_sid = %call_sid, "prompt for unknown or terminated session ignored");
            return;
        };

        let Some(question) = self.questions.get(index).cloned() else {
            // Defensive re-entry guard: every question is already answered.
            self.finalize_logged(
                call_sid,
                COMPLETION_MESSAGE,
                SessionStatus::Completed,
                TerminationReason::Completed,
            )
            .await;
            return;
        };

        match self.validator.validate_answer(&question, raw_answer).await {
            Ok(AnswerVerdict::Valid(value)) => {
                self.accept_answer(call_sid, &question, value, sink).await;
            }
            Ok(AnswerVerdict::Invalid { feedback }) => {
                self.reject_answer(call_sid, &question, feedback, sink).await;
            }
            Err(e) => {
                // Validator failure is not the caller's fault: re-ask without
                // consuming an attempt.
                tracing::warn!(call_sid = %call_sid, question = %question.id, "answer validation failed: {e}");
                sink.speak(&format!("{VALIDATOR_ERROR_MESSAGE} {}", question.prompt));
                self.watchdog.start(call_sid).await;
            }
        }
    }

    /// Interrupts carry no meaning for a questionnaire: there is no
    /// assistant transcript to truncate.
    pub async fn on_interrupt(&self, call_sid: &str, _utterance: &str) {
        tracing::info!(call_sid = %call_sid, "interrupt during questionnaire ignored");
    }

    /// Drops the session when the connection goes away. Leaves no dangling
    /// timer.
    pub async fn on_disconnect(&self, call_sid: &str) {
        self.registry.remove(call_sid).await;
        tracing::info!(call_sid = %call_sid, "questionnaire session cleaned up");
    }

    async fn accept_answer(
        &self,
        call_sid: &str,
        question: &Question,
        value: AnswerValue,
        sink: &RelaySink,
    ) {
        let next_index = self
            .registry
            .with_live_session(call_sid, |session| {
                session.invalid_attempts = 0;
                session.answers.insert(question.id.clone(), value);
                session.question_index += 1;
                session.question_index
            })
            .await;
        let Some(next_index) = next_index else {
            tracing::warn!(call_sid = %call_sid, "session vanished while validating; answer dropped");
            return;
        };

        match self.questions.get(next_index) {
            Some(next) => {
                sink.speak(&next.prompt);
                self.watchdog.start(call_sid).await;
            }
            None => {
                self.finalize_logged(
                    call_sid,
                    COMPLETION_MESSAGE,
                    SessionStatus::Completed,
                    TerminationReason::Completed,
                )
                .await;
            }
        }
    }

    async fn reject_answer(
        &self,
        call_sid: &str,
        question: &Question,
        feedback: Option<String>,
        sink: &RelaySink,
    ) {
        let attempts = self
            .registry
            .with_live_session(call_sid, |session| {
                session.invalid_attempts += 1;
                session.invalid_attempts
            })
            .await;
        let Some(attempts) = attempts else {
            tracing::warn!(call_sid = %call_sid, "session vanished while validating; rejection dropped");
            return;
        };

        if attempts >= MAX_INVALID_ATTEMPTS {
            self.finalize_logged(
                call_sid,
                INVALID_ANSWERS_MESSAGE,
                SessionStatus::Terminated,
                TerminationReason::InvalidAnswers,
            )
            .await;
            return;
        }

        let hint = feedback.unwrap_or_else(|| RETRY_FALLBACK.to_string());
        sink.speak(&format!("{hint} {}", question.prompt));
        self.watchdog.start(call_sid).await;
    }

    async fn finalize_logged(
        &self,
        call_sid: &str,
        message: &str,
        status: SessionStatus,
        reason: TerminationReason,
    ) {
        if let Err(e) = self
            .terminator
            .finalize(call_sid, message, status, reason, None)
            .await
        {
            tracing::error!(call_sid = %call_sid, "finalize failed: {e}");
        }
    }
}
