use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub twiml: TwimlConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL handed to Twilio as the webhook origin.
    /// When unset, the origin of the incoming request is used.
    #[serde(default)]
    pub external_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            external_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Default caller id for outbound calls.
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Destination used by GET /outbound when no `to_number` is given.
    #[serde(default)]
    pub default_to_number: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            phone_number: None,
            default_to_number: None,
            api_base_url: default_api_base_url(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

impl TwilioConfig {
    /// Account SID and auth token, if both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.account_sid.as_deref(), self.auth_token.as_deref()) {
            (Some(sid), Some(token)) => Some((sid, token)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwimlConfig {
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
}

impl Default for TwimlConfig {
    fn default() -> Self {
        Self {
            template_path: default_template_path(),
        }
    }
}

fn default_template_path() -> PathBuf {
    PathBuf::from("templates/streams.xml")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BotConfig {
    /// Testing mode: the built-in bot loops caller audio back.
    #[serde(default)]
    pub testing: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file from same directory as config.toml
        let env_path = config_dir().join(".env");
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!("Loaded .env from {}", env_path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(
                    "No .env file at {}, using environment only",
                    env_path.display()
                );
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let path = config_path();
        let mut config = if path.exists() {
            tracing::info!("Loading config from {}", path.display());
            let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            Self::from_toml(&contents)?
        } else {
            tracing::info!(
                "No config file at {}, using defaults and environment",
                path.display()
            );
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.normalize();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay values from the environment (or any other key lookup).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = Some(v);
        }
        if let Some(v) = lookup("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = Some(v);
        }
        if let Some(v) = lookup("TWILIO_PHONE_NUMBER") {
            self.twilio.phone_number = Some(v);
        }
        if let Some(v) = lookup("DEFAULT_TO_NUMBER") {
            self.twilio.default_to_number = Some(v);
        }
        if let Some(v) = lookup("SERVER_EXTERNAL_URL") {
            self.server.external_url = Some(v);
        }
        if let Some(v) = lookup("TWIML_TEMPLATE_PATH").filter(|v| !v.trim().is_empty()) {
            self.twiml.template_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CALL_RELAY_TESTING") {
            self.bot.testing = parse_flag(&v).ok_or(ConfigError::InvalidEnv {
                key: "CALL_RELAY_TESTING",
                value: v,
            })?;
        }
        Ok(())
    }

    /// Blank values count as "not configured".
    pub fn normalize(&mut self) {
        for field in [
            &mut self.twilio.account_sid,
            &mut self.twilio.auth_token,
            &mut self.twilio.phone_number,
            &mut self.twilio.default_to_number,
            &mut self.server.external_url,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        if self
            .twiml
            .template_path
            .to_str()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.twiml.template_path = default_template_path();
        }
        if let Some(url) = self.server.external_url.as_mut() {
            let trimmed = url.trim_end_matches('/').len();
            url.truncate(trimmed);
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn config_dir() -> PathBuf {
    if let Ok(p) = std::env::var("CALL_RELAY_CONFIG") {
        // If pointing to a file, use its parent directory
        let path = PathBuf::from(p);
        return path.parent().map(|p| p.to_path_buf()).unwrap_or(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".call-relay")
}

fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("CALL_RELAY_CONFIG") {
        return PathBuf::from(p);
    }

    config_dir().join("config.toml")
}
