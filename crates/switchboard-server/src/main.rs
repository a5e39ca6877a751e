//! Switchboard server binary: relays voice calls between the telephony
//! platform and the AI backend.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchboard_ai::{AnswerValidator, ChatStream, OpenAiClient, OpenAiConfig, TranscriptClassifier};
use switchboard_compliance::CompliancePipeline;
use switchboard_server::config::{self, RelayMode};
use switchboard_server::observers::ObserverManager;
use switchboard_server::{app, AppState};
use switchboard_session::{
    CallTerminator, ConversationEngine, ConversationRegistry, QuestionnaireEngine, SessionRegistry,
};
use switchboard_telephony::{CallControl, TwilioCallControl, TwilioConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("SWITCHBOARD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = switchboard_db::create_pool(
        &config.database.path,
        switchboard_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            switchboard_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // External collaborators
    let ai = Arc::new(OpenAiClient::new(
        OpenAiConfig::new(config.ai.api_key.clone(), config.ai.model.clone())
            .with_base_url(config.ai.base_url.clone()),
        config.questionnaire.known_companies.clone(),
    ));
    let call_control: Arc<dyn CallControl> = Arc::new(
        TwilioCallControl::new(
            TwilioConfig::new(
                config.telephony.account_sid.clone(),
                config.telephony.auth_token.clone(),
            )
            .with_api_base(config.telephony.api_base.clone()),
        )
        .expect("telephony credentials are required; set TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN"),
    );

    // Core engines
    let registry = SessionRegistry::new();
    let terminator = Arc::new(CallTerminator::new(
        registry.clone(),
        pool.clone(),
        call_control,
    ));
    let questionnaire = Arc::new(QuestionnaireEngine::new(
        registry,
        ai.clone() as Arc<dyn AnswerValidator>,
        terminator,
        config.questionnaire.questions_or_default(),
        Duration::from_secs(config.relay.silence_timeout_secs),
    ));
    let conversation = Arc::new(ConversationEngine::new(
        ConversationRegistry::new(),
        ai.clone() as Arc<dyn ChatStream>,
        config.relay.system_prompt.clone(),
    ));
    let pipeline = Arc::new(CompliancePipeline::new(
        ai.clone() as Arc<dyn TranscriptClassifier>,
    ));

    if config.relay.public_host.is_empty() {
        tracing::warn!(
            "relay.public_host is not set; the /twiml bootstrap will hand out an unreachable \
             WebSocket URL"
        );
    }
    let ws_url = format!("wss://{}/ws", config.relay.public_host);

    let state = AppState {
        pool,
        mode: config.relay.mode,
        questionnaire,
        conversation,
        pipeline,
        observers: ObserverManager::new(),
        ws_url,
        greeting: config.relay.greeting.clone(),
    };

    let mode_label = match config.relay.mode {
        RelayMode::Questionnaire => "questionnaire",
        RelayMode::Conversation => "conversation",
    };

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, mode = mode_label, "starting switchboard server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("switchboard server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
