//! The call-control sink: end a live call with a final spoken message.

use crate::error::TelephonyError;
use crate::twiml::hangup_document;
use async_trait::async_trait;
use std::time::Duration;

/// Timeout for call-control REST requests.
const CALL_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminates live calls.
///
/// Implementations must be safe to call after the call has already ended on
/// the platform side; a rejection is an error for the caller to log, not a
/// panic.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Causes the platform to speak `spoken_text` on the call and then end
    /// it.
    async fn end_call(&self, call_sid: &str, spoken_text: &str) -> Result<(), TelephonyError>;
}

/// Configuration for the Twilio-compatible call-control client.
#[derive(Debug, Clone, Default)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// API base, overridable for tests (defaults to the public API host).
    pub api_base: String,
}

impl TwilioConfig {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            api_base: "https://api.twilio.com".to_string(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

/// REST client updating a live call with speak-then-hangup markup.
pub struct TwilioCallControl {
    config: TwilioConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for TwilioCallControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioCallControl")
            .field("account_sid", &self.config.account_sid)
            .field("api_base", &self.config.api_base)
            .finish()
    }
}

impl TwilioCallControl {
    pub fn new(config: TwilioConfig) -> Result<Self, TelephonyError> {
        if config.account_sid.trim().is_empty() || config.auth_token.trim().is_empty() {
            return Err(TelephonyError::Config(
                "account_sid and auth_token are required".to_string(),
            ));
        }
        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.api_base, self.config.account_sid, call_sid
        )
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn end_call(&self, call_sid: &str, spoken_text: &str) -> Result<(), TelephonyError> {
        let twiml = hangup_document(spoken_text);
        let request = self
            .http
            .post(self.call_url(call_sid))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Twiml", twiml.as_str())]);

        let response = tokio::time::timeout(CALL_CONTROL_TIMEOUT, request.send())
            .await
            .map_err(|_| {
                TelephonyError::Request(format!(
                    "call control timed out after {} seconds",
                    CALL_CONTROL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| TelephonyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected(status.as_u16(), body));
        }

        tracing::info!(call_sid = %call_sid, "call terminated via call control");
        Ok(())
    }
}
