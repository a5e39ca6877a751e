//! The call bootstrap route.

use crate::AppState;
use axum::{extract::Extension, http::header, response::IntoResponse};
use std::sync::Arc;

/// Handler for `GET /twiml`.
///
/// The telephony platform fetches this when a call comes in; the returned
/// document connects the call to the relay WebSocket with the configured
/// greeting.
pub async fn twiml_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let body = switchboard_telephony::bootstrap_document(&state.ws_url, &state.greeting);
    ([(header::CONTENT_TYPE, "text/xml")], body)
}
