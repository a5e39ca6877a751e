//! OpenAI-compatible HTTP client implementing the three source contracts.

use crate::error::AiError;
use crate::source::{AnswerValidator, ChatStream, TokenStream, TranscriptClassifier};
use crate::sse::{SseLineParser, DONE_SENTINEL};
use crate::verdict::{coerce_verdict, parse_compliance_verdict};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use switchboard_types::{AnswerVerdict, ComplianceVerdict, KnownCompanyPolicy, Question, Turn};

/// Timeout for non-streaming completion requests.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum raw answer size submitted for validation (4 KiB). A voice
/// transcript turn should never come close; anything larger is garbage in.
const MAX_VALIDATION_INPUT_BYTES: usize = 4 * 1024;

/// Maximum transcript-plus-context size submitted for classification (16 KiB).
const MAX_CLASSIFY_INPUT_BYTES: usize = 16 * 1024;

/// Configuration for the OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL (defaults to `https://api.openai.com`).
    pub base_url: String,
    /// The model to use.
    pub model: String,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".into(),
            model: model.into(),
        }
    }

    /// Sets a custom base URL (for proxies and tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// The production AI Response Source.
pub struct OpenAiClient {
    config: OpenAiConfig,
    companies: KnownCompanyPolicy,
    http: reqwest::Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig, companies: KnownCompanyPolicy) -> Self {
        Self {
            config,
            companies,
            http: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    async fn post_completions(&self, body: Value) -> Result<reqwest::Response, AiError> {
        let response = self
            .http
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Request(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        Ok(response)
    }

    /// Runs a single non-streaming completion expected to return one JSON
    /// object as its message content.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, AiError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {"type": "json_object"},
            "stream": false,
        });

        let response = tokio::time::timeout(COMPLETION_TIMEOUT, async {
            let response = self.post_completions(body).await?;
            response
                .json::<Value>()
                .await
                .map_err(|e| AiError::Provider(format!("completion body unreadable: {e}")))
        })
        .await
        .map_err(|_| {
            AiError::Request(format!(
                "completion timed out after {} seconds",
                COMPLETION_TIMEOUT.as_secs()
            ))
        })??;

        let content = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| AiError::MalformedOutput("missing message content".to_string()))?;

        serde_json::from_str(content)
            .map_err(|e| AiError::MalformedOutput(format!("content is not JSON: {e}")))
    }
}

/// Maps an HTTP error status to the appropriate [`AiError`].
fn map_http_error(status: reqwest::StatusCode, body: &str) -> AiError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 => AiError::Auth(format!("authentication failed: {message}")),
        429 => AiError::Request(format!("rate limited: {message}")),
        _ => AiError::Provider(format!("HTTP {}: {message}", status.as_u16())),
    }
}

/// Extracts an error message from a provider error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Extracts `choices[0].delta.content` from one streaming chunk payload.
fn delta_content(data: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(data).ok()?;
    let content = parsed
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

fn turns_to_messages(turns: &[Turn]) -> Vec<Value> {
    turns
        .iter()
        .map(|t| json!({"role": t.role.as_str(), "content": t.content}))
        .collect()
}

#[async_trait]
impl ChatStream for OpenAiClient {
    async fn stream_reply(&self, turns: &[Turn]) -> Result<TokenStream, AiError> {
        let body = json!({
            "model": self.config.model,
            "messages": turns_to_messages(turns),
            "stream": true,
        });

        tracing::debug!(model = %self.config.model, "starting streaming completion");
        let response = self.post_completions(body).await?;
        let mut byte_stream = Box::pin(response.bytes_stream());

        let stream = async_stream::try_stream! {
            let mut parser = SseLineParser::new();
            'read: while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| AiError::Stream(e.to_string()))?;
                for payload in parser.push(&chunk) {
                    if payload.trim() == DONE_SENTINEL {
                        break 'read;
                    }
                    if let Some(token) = delta_content(&payload) {
                        yield token;
                    }
                }
            }
            if let Some(payload) = parser.flush() {
                if payload.trim() != DONE_SENTINEL {
                    if let Some(token) = delta_content(&payload) {
                        yield token;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl AnswerValidator for OpenAiClient {
    async fn validate_answer(
        &self,
        question: &Question,
        raw_answer: &str,
    ) -> Result<AnswerVerdict, AiError> {
        if raw_answer.len() > MAX_VALIDATION_INPUT_BYTES {
            return Err(AiError::InputTooLarge(
                raw_answer.len(),
                MAX_VALIDATION_INPUT_BYTES,
            ));
        }

        let system = validation_instructions(question);
        let user = json!({
            "question": question.prompt,
            "answer": raw_answer,
        })
        .to_string();

        let raw = self.complete_json(&system, &user).await?;
        Ok(coerce_verdict(question.kind, &raw, &self.companies))
    }
}

#[async_trait]
impl TranscriptClassifier for OpenAiClient {
    async fn classify(
        &self,
        transcript: &str,
        context: &[String],
    ) -> Result<ComplianceVerdict, AiError> {
        let total: usize = transcript.len() + context.iter().map(String::len).sum::<usize>();
        if total > MAX_CLASSIFY_INPUT_BYTES {
            return Err(AiError::InputTooLarge(total, MAX_CLASSIFY_INPUT_BYTES));
        }

        let system = "You review call-center transcript snippets for policy violations: \
                      threats, harassment, disclosure of payment card or social security \
                      numbers, and deceptive claims. Use the earlier snippets only as \
                      context; judge the current snippet. Respond with a JSON object \
                      {\"violation\": boolean, \"phrases\": [exact offending phrases \
                      quoted verbatim from the current snippet or context]}.";
        let user = json!({
            "context": context,
            "current": transcript,
        })
        .to_string();

        let raw = self.complete_json(system, &user).await?;
        Ok(parse_compliance_verdict(&raw))
    }
}

/// Builds the validation system prompt for a question kind.
fn validation_instructions(question: &Question) -> String {
    let shape = match question.kind {
        switchboard_types::QuestionKind::Name => {
            "\"value\" must be the person's name as a string"
        }
        switchboard_types::QuestionKind::YesNo => {
            "\"value\" must be exactly \"yes\" or \"no\"; mark ambiguous intent invalid"
        }
        switchboard_types::QuestionKind::Scale1To10 => {
            "\"value\" must be an integer from 1 to 10; mark ambiguous ratings invalid"
        }
        switchboard_types::QuestionKind::TopicText => {
            "\"value\" must be the answer as cleaned-up text; mark off-topic answers invalid"
        }
        switchboard_types::QuestionKind::TopicEntity => {
            "\"value\" must be {\"name\": the company name}; mark it invalid if no company \
             name can be extracted"
        }
    };

    format!(
        "You validate spoken questionnaire answers. Given a question and the caller's \
         raw answer, respond with a JSON object {{\"valid\": boolean, \"value\": ..., \
         \"feedback\": short spoken-style hint when invalid}}. {shape}."
    )
}
