//! Switchboard server library logic.

pub mod api_compliance;
pub mod api_relay;
pub mod api_twiml;
pub mod api_webhooks;
pub mod config;
pub mod observers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::RelayMode;
use observers::ObserverManager;
use switchboard_compliance::CompliancePipeline;
use switchboard_db::DbPool;
use switchboard_session::{ConversationEngine, QuestionnaireEngine};

/// Maximum request body size (2 MiB). Protects against OOM from oversized
/// webhook payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Which engine drives relay sessions.
    pub mode: RelayMode,
    /// Questionnaire engine (active in questionnaire mode).
    pub questionnaire: Arc<QuestionnaireEngine>,
    /// Conversation engine (active in conversation mode).
    pub conversation: Arc<ConversationEngine>,
    /// Dedup + classification pipeline for transcription webhooks.
    pub pipeline: Arc<CompliancePipeline>,
    /// Connected compliance observers.
    pub observers: ObserverManager,
    /// Public WebSocket URL handed to the telephony platform.
    pub ws_url: String,
    /// Spoken greeting when a call connects.
    pub greeting: String,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load balancers,
/// monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/twiml", get(api_twiml::twiml_handler))
        .route(
            "/transcription",
            post(api_webhooks::transcription_webhook_handler),
        )
        .route("/summary", post(api_webhooks::summary_webhook_handler))
        .route("/ws", get(api_relay::relay_ws_handler))
        .route("/compliance", get(api_compliance::compliance_ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
