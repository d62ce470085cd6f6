use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::twilio::rest::{CallResource, TwilioClient};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CallStatusResponse {
    pub call_sid: String,
    pub status: String,
    pub direction: Option<String>,
    pub to: Option<String>,
    pub duration: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<CallResource> for CallStatusResponse {
    fn from(call: CallResource) -> Self {
        Self {
            call_sid: call.sid,
            status: call.status,
            direction: call.direction,
            to: call.to,
            duration: call.duration,
            start_time: call.start_time,
            end_time: call.end_time,
        }
    }
}

/// GET /call-status/{call_sid}
pub async fn handle_call_status(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Result<Json<CallStatusResponse>, ApiError> {
    let client =
        TwilioClient::from_config(&state.config.twilio).ok_or_else(ApiError::credentials_missing)?;

    let call = client.fetch_call(&call_sid).await.map_err(|e| {
        tracing::error!(call_sid = %call_sid, "Error fetching call status: {e}");
        ApiError::internal(format!("Failed to fetch call status: {e}"))
    })?;

    tracing::debug!(call_sid = %call.sid, status = %call.status, "Fetched call status");
    Ok(Json(call.into()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::twilio::fake::FakeTwilio;
    use crate::{router, test_state};

    async fn get(config: Config, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router(test_state(config))
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn configured(fake: &FakeTwilio) -> Config {
        let mut config = Config::default();
        config.twilio.account_sid = Some(FakeTwilio::ACCOUNT_SID.into());
        config.twilio.auth_token = Some(FakeTwilio::AUTH_TOKEN.into());
        config.twilio.api_base_url = fake.url.clone();
        config
    }

    #[tokio::test]
    async fn projects_call_fields() {
        let fake = FakeTwilio::start().await;
        let (status, body) = get(
            configured(&fake),
            &format!("/call-status/{}", FakeTwilio::KNOWN_SID),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "call_sid": FakeTwilio::KNOWN_SID,
                "status": "completed",
                "direction": "inbound",
                "to": "+15550001111",
                "duration": "42",
                "start_time": "2026-10-02T09:15:00Z",
                "end_time": "2026-10-02T09:15:42Z"
            })
        );
    }

    #[tokio::test]
    async fn missing_credentials_is_server_error() {
        let (status, body) = get(Config::default(), "/call-status/CA1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Twilio credentials not configured");
    }

    #[tokio::test]
    async fn unknown_call_is_wrapped_provider_error() {
        let fake = FakeTwilio::start().await;
        let (status, body) = get(configured(&fake), "/call-status/CAnope").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Failed to fetch call status: "), "{detail}");
        assert!(detail.contains("404"), "{detail}");
    }

    #[tokio::test]
    async fn encoded_path_tricks_are_rejected() {
        let fake = FakeTwilio::start().await;
        let (status, body) = get(
            configured(&fake),
            "/call-status/..%2F..%2F..%2F..%2FAccounts%2FACother%2FRecordings",
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body["detail"].as_str().unwrap();
        assert!(
            detail.starts_with("Failed to fetch call status: Invalid call SID"),
            "{detail}"
        );
    }
}
