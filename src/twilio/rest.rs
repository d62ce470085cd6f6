use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::config::TwilioConfig;

/// Twilio REST API client for placing and inspecting calls.
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

/// Parameters for a new outbound call.
#[derive(Debug)]
pub struct NewCall<'a> {
    pub to: &'a str,
    pub from: &'a str,
    /// Webhook Twilio requests for TwiML once the callee answers.
    pub url: &'a str,
    pub method: &'a str,
}

/// The subset of Twilio's Call resource this server reads.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResource {
    pub sid: String,
    pub status: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    /// Seconds, as a string. Null until the call completes.
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "rfc2822_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "rfc2822_opt")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Error document Twilio returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u32>,
    message: String,
}

impl TwilioClient {
    /// Build a client from config. Returns `None` when credentials are missing.
    pub fn from_config(twilio_config: &TwilioConfig) -> Option<Self> {
        let (sid, token) = twilio_config.credentials()?;
        Some(Self::new(sid, token, &twilio_config.api_base_url))
    }

    pub fn new(account_sid: &str, auth_token: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/2010-04-01/Accounts/<sid>/<segments..>`, each segment percent-encoded.
    fn account_url(&self, segments: &[&str]) -> Result<reqwest::Url, TwilioError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| TwilioError::Request(format!("invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TwilioError::Request("invalid API base URL".to_string()))?
            .pop_if_empty()
            .extend(["2010-04-01", "Accounts", self.account_sid.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Place an outbound call. Twilio dials `to` and, once answered,
    /// requests `url` for the TwiML that drives the call.
    pub async fn create_call(&self, call: &NewCall<'_>) -> Result<CallResource, TwilioError> {
        let params = [
            ("To", call.to),
            ("From", call.from),
            ("Url", call.url),
            ("Method", call.method),
        ];

        let resp = self
            .client
            .post(self.account_url(&["Calls.json"])?)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))?;

        let created: CallResource = decode(resp).await?;
        tracing::info!(
            to = call.to,
            from = created.from.as_deref().unwrap_or(call.from),
            call_sid = %created.sid,
            "Outbound call created"
        );
        Ok(created)
    }

    /// Fetch the current state of a call.
    pub async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, TwilioError> {
        if !is_valid_sid(call_sid) {
            return Err(TwilioError::InvalidSid(call_sid.to_string()));
        }

        let resp = self
            .client
            .get(self.account_url(&["Calls", &format!("{call_sid}.json")])?)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))?;

        decode(resp).await
    }
}

/// Twilio SIDs are a two-letter prefix followed by hex digits.
fn is_valid_sid(sid: &str) -> bool {
    !sid.is_empty() && sid.bytes().all(|b| b.is_ascii_alphanumeric())
}

async fn decode(resp: reqwest::Response) -> Result<CallResource, TwilioError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(ApiErrorBody {
                code: Some(code),
                message,
            }) => format!("{message} (code {code})"),
            Ok(ApiErrorBody { message, .. }) => message,
            Err(_) => body,
        };
        return Err(TwilioError::Api {
            status: status.as_u16(),
            message,
        });
    }

    resp.json()
        .await
        .map_err(|e| TwilioError::Decode(e.to_string()))
}

fn rfc2822_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc2822(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Twilio API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid call SID: {0:?}")]
    InvalidSid(String),
    #[error("Unexpected Twilio response: {0}")]
    Decode(String),
}
