//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use switchboard_types::{KnownCompanyPolicy, Question};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Relay behavior settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// AI backend settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Telephony platform credentials.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Questionnaire contents.
    #[serde(default)]
    pub questionnaire: QuestionnaireConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "switchboard_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Which engine drives relay sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Fixed question list with validation and a silence watchdog.
    #[default]
    Questionnaire,
    /// Free-form streaming conversation.
    Conversation,
}

/// Relay behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub mode: RelayMode,

    /// Public hostname the telephony platform can reach (e.g. the tunnel
    /// host). Used to build the WebSocket URL in the bootstrap document.
    #[serde(default)]
    pub public_host: String,

    /// Spoken greeting when the call connects.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// System prompt for conversation mode.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Seconds of caller silence before the watchdog ends the call.
    #[serde(default = "default_silence_timeout_secs")]
    pub silence_timeout_secs: u64,
}

/// AI backend configuration. The API key usually comes from the
/// `OPENAI_API_KEY` environment variable rather than the file.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,
}

/// Telephony platform credentials. Usually supplied via
/// `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN`.
#[derive(Debug, Clone, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    #[serde(default = "default_telephony_api_base")]
    pub api_base: String,
}

/// Questionnaire contents and the known-company allow-list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionnaireConfig {
    /// Ordered question list; the built-in intake set applies when empty.
    #[serde(default)]
    pub questions: Vec<Question>,

    #[serde(default)]
    pub known_companies: KnownCompanyPolicy,
}

impl QuestionnaireConfig {
    /// The effective question list.
    pub fn questions_or_default(&self) -> Vec<Question> {
        if self.questions.is_empty() {
            Question::default_intake()
        } else {
            self.questions.clone()
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "switchboard.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_greeting() -> String {
    "Hi! I am a voice assistant. How can I help you today?".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful voice assistant. Keep replies short and speakable.".to_string()
}

fn default_silence_timeout_secs() -> u64 {
    30
}

fn default_ai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_telephony_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            public_host: String::new(),
            greeting: default_greeting(),
            system_prompt: default_system_prompt(),
            silence_timeout_secs: default_silence_timeout_secs(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_ai_base_url(),
            model: default_ai_model(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            api_base: default_telephony_api_base(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SWITCHBOARD_HOST` overrides `server.host`
/// - `SWITCHBOARD_PORT` overrides `server.port`
/// - `SWITCHBOARD_DB_PATH` overrides `database.path`
/// - `SWITCHBOARD_LOG_LEVEL` overrides `logging.level`
/// - `SWITCHBOARD_LOG_JSON` overrides `logging.json` (set to "true")
/// - `SWITCHBOARD_PUBLIC_HOST` overrides `relay.public_host`
/// - `OPENAI_API_KEY` overrides `ai.api_key`
/// - `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` override the telephony
///   credentials
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("SWITCHBOARD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("SWITCHBOARD_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("SWITCHBOARD_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("SWITCHBOARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("SWITCHBOARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(host) = std::env::var("SWITCHBOARD_PUBLIC_HOST") {
        config.relay.public_host = host;
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.ai.api_key = key;
    }
    if let Ok(sid) = std::env::var("TWILIO_ACCOUNT_SID") {
        config.telephony.account_sid = sid;
    }
    if let Ok(token) = std::env::var("TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = token;
    }

    Ok(config)
}
