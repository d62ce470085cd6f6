use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::AppState;

/// Handle POST /: Twilio webhook for incoming calls.
///
/// Responds with the TwiML template, which connects the call to the
/// /ws media stream.
pub async fn handle_incoming(State(state): State<AppState>) -> Response {
    tracing::info!("POST TwiML - incoming call");
    serve_template(&state).await
}

/// Handle POST /outbound-twiml: webhook Twilio requests once an outbound
/// call placed through GET /outbound is answered.
pub async fn handle_outbound_twiml(State(state): State<AppState>) -> Response {
    tracing::info!("POST TwiML - outbound call connected");
    serve_template(&state).await
}

/// Read the template from disk on every request so edits apply without a restart.
async fn serve_template(state: &AppState) -> Response {
    let path = &state.config.twiml.template_path;
    match tokio::fs::read_to_string(path).await {
        Ok(twiml) => ([(header::CONTENT_TYPE, "application/xml")], twiml).into_response(),
        Err(e) => {
            tracing::error!(path = %path.display(), "Failed to read TwiML template: {e}");
            ApiError::internal(format!("Failed to read TwiML template: {e}")).into_response()
        }
    }
}
