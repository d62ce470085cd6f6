use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::twilio::rest::{NewCall, TwilioClient};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OutboundQuery {
    /// Number to call (E.164). Falls back to `twilio.default_to_number`.
    pub to_number: Option<String>,
    /// Caller id. Falls back to `twilio.phone_number`.
    pub from_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutboundResponse {
    pub success: bool,
    pub call_sid: String,
    pub status: String,
    pub to: String,
    pub from: String,
    pub webhook_url: String,
}

/// GET /outbound: place a call that Twilio connects back to /outbound-twiml.
pub async fn handle_outbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OutboundQuery>,
) -> Result<Json<OutboundResponse>, ApiError> {
    let twilio_config = &state.config.twilio;
    let client = TwilioClient::from_config(twilio_config).ok_or_else(|| {
        tracing::error!("Outbound call rejected: Twilio credentials not configured");
        ApiError::credentials_missing()
    })?;

    let from = non_empty(query.from_number)
        .or_else(|| twilio_config.phone_number.clone())
        .ok_or_else(|| {
            ApiError::bad_request("From number not provided and no default configured")
        })?;
    let to = non_empty(query.to_number)
        .or_else(|| twilio_config.default_to_number.clone())
        .ok_or_else(|| ApiError::bad_request("To number not provided and no default configured"))?;

    let base_url = webhook_base_url(state.config.server.external_url.as_deref(), &headers)
        .ok_or_else(|| ApiError::bad_request("Cannot determine webhook URL: no Host header"))?;
    let webhook_url = format!("{base_url}/outbound-twiml");

    tracing::info!(to = %to, from = %from, "Outbound call requested");

    let call = client
        .create_call(&NewCall {
            to: &to,
            from: &from,
            url: &webhook_url,
            method: "POST",
        })
        .await
        .map_err(|e| {
            tracing::error!("Error initiating outbound call: {e}");
            ApiError::internal(format!("Failed to initiate call: {e}"))
        })?;

    tracing::info!(call_sid = %call.sid, webhook_url = %webhook_url, "Outbound call initiated");

    Ok(Json(OutboundResponse {
        success: true,
        call_sid: call.sid,
        status: call.status,
        to,
        from,
        webhook_url,
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `scheme://host` Twilio should use to reach this server.
///
/// A configured external URL wins; otherwise the request's own origin is
/// rebuilt, honouring reverse-proxy forwarding headers.
fn webhook_base_url(external_url: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(url) = external_url {
        return Some(url.trim_end_matches('/').to_string());
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host").or_else(|| header("host"))?;
    Some(format!("{scheme}://{host}"))
}
