//! In-process stand-in for the Twilio Calls API, used by tests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::Engine;
use serde_json::json;
use tokio::sync::Mutex;

type Captured = Arc<Mutex<Option<HashMap<String, String>>>>;

pub struct FakeTwilio {
    pub url: String,
    captured: Captured,
}

impl FakeTwilio {
    pub const ACCOUNT_SID: &'static str = "ACtest";
    pub const AUTH_TOKEN: &'static str = "test-token";
    pub const CREATED_SID: &'static str = "CAcreated";
    pub const KNOWN_SID: &'static str = "CAknown";

    pub async fn start() -> Self {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/2010-04-01/Accounts/{account}/Calls.json",
                post(create_call),
            )
            .route("/2010-04-01/Accounts/{account}/Calls/{file}", get(fetch_call))
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            captured,
        }
    }

    /// Form body of the most recent create-call request.
    pub async fn last_form(&self) -> Option<HashMap<String, String>> {
        self.captured.lock().await.clone()
    }
}

fn authorized(headers: &HeaderMap, account: &str) -> bool {
    let expected = base64::engine::general_purpose::STANDARD.encode(format!(
        "{}:{}",
        FakeTwilio::ACCOUNT_SID,
        FakeTwilio::AUTH_TOKEN
    ));
    account == FakeTwilio::ACCOUNT_SID
        && headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
            == Some(expected.as_str())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "code": 20003,
            "message": "Authenticate",
            "more_info": "https://www.twilio.com/docs/errors/20003",
            "status": 401
        })),
    )
        .into_response()
}

async fn create_call(
    State(captured): State<Captured>,
    Path(account): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers, &account) {
        return unauthorized();
    }
    let to = form.get("To").cloned().unwrap_or_default();
    let from = form.get("From").cloned().unwrap_or_default();
    *captured.lock().await = Some(form);

    (
        StatusCode::CREATED,
        Json(json!({
            "sid": FakeTwilio::CREATED_SID,
            "status": "queued",
            "direction": "outbound-api",
            "to": to,
            "from": from,
            "duration": null,
            "start_time": null,
            "end_time": null
        })),
    )
        .into_response()
}

async fn fetch_call(
    Path((account, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers, &account) {
        return unauthorized();
    }
    let sid = file.strip_suffix(".json").unwrap_or(&file);
    if sid != FakeTwilio::KNOWN_SID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "code": 20404,
                "message": format!("The requested resource /Calls/{sid}.json was not found"),
                "more_info": "https://www.twilio.com/docs/errors/20404",
                "status": 404
            })),
        )
            .into_response();
    }

    Json(json!({
        "sid": FakeTwilio::KNOWN_SID,
        "status": "completed",
        "direction": "inbound",
        "to": "+15550001111",
        "from": "+15550002222",
        "duration": "42",
        "start_time": "Fri, 02 Oct 2026 09:15:00 +0000",
        "end_time": "Fri, 02 Oct 2026 09:15:42 +0000"
    }))
    .into_response()
}
