//! Transcription and summary webhook handlers.
//!
//! The platform posts callbacks either form-encoded or as JSON, and not
//! always with an honest Content-Type, so decoding is negotiated with a
//! fallback ladder: declared urlencoded → declared JSON → probe urlencoded
//! → probe JSON → capture the raw body. Decoding never fails; the worst
//! input degrades to `{"raw_body": ...}` and still flows to observers.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::{header, HeaderMap},
    Json,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use switchboard_types::TranscriptionPayload;

/// Handler for `POST /transcription`.
///
/// Deduplicates, classifies, and fans the enriched event out to every
/// connected observer. Responds with the delivered-observer count.
pub async fn transcription_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let payload = TranscriptionPayload::new(parse_webhook_body(&headers, &body));

    let Some(enriched) = state.pipeline.process(payload).await else {
        tracing::info!("duplicate transcription event skipped");
        return Json(json!({"ok": true, "delivered_clients": 0}));
    };

    let delivered = broadcast_event(&state, &enriched).await;
    tracing::info!(delivered, "transcription event fanned out");
    Json(json!({"ok": true, "delivered_clients": delivered}))
}

/// Handler for `POST /summary`.
///
/// Signals end of call: clears the call's compliance context window, then
/// forwards the (unclassified) summary to observers.
pub async fn summary_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let payload = TranscriptionPayload::new(parse_webhook_body(&headers, &body));

    if let Some(call_sid) = payload.call_sid() {
        state.pipeline.end_of_call(call_sid);
    } else {
        tracing::warn!("summary event without CallSid; no context to clear");
    }

    let enriched = payload.enriched(false, &[]);
    let delivered = broadcast_event(&state, &enriched).await;
    Json(json!({"ok": true, "delivered_clients": delivered}))
}

/// Serializes the enriched event once and delivers it to all observers.
async fn broadcast_event(state: &AppState, event: &TranscriptionPayload) -> usize {
    match serde_json::to_string(event) {
        Ok(message) => state.observers.broadcast(message).await,
        Err(e) => {
            tracing::error!("failed to serialize enriched event: {e}");
            0
        }
    }
}

/// Decodes a webhook body into a flat field map.
pub(crate) fn parse_webhook_body(headers: &HeaderMap, body: &[u8]) -> Map<String, Value> {
    let decoded = String::from_utf8_lossy(body);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();

    if content_type.contains("application/x-www-form-urlencoded") {
        return form_map(&decoded);
    }

    if content_type.contains("application/json") {
        return json_map(&decoded);
    }

    // No (or unrecognized) declared type: probe. Form bodies always carry
    // '='; everything else gets the JSON treatment.
    if decoded.contains('=') {
        return form_map(&decoded);
    }
    json_map(&decoded)
}

fn form_map(body: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

fn json_map(body: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        }
        Err(_) => {
            let mut map = Map::new();
            map.insert("raw_body".to_string(), Value::String(body.to_string()));
            map
        }
    }
}
