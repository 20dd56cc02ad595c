//! Connection settings for the tracker and chat clients.
//!
//! Env variables:
//! - `CLICKUP_API_KEY` (required), `CLICKUP_FOLDER_ID` (required for folder
//!   scans), `CLICKUP_BASE_API` (default `https://api.clickup.com/api/v2`)
//! - `SLACK_BOT_TOKEN` (optional; no chat data without it),
//!   `SLACK_BASE_API` (default `https://slack.com/api`)
//! - `SOURCES_HTTP_TIMEOUT_SECS` (default 30)

use std::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_CLICKUP_BASE_API: &str = "https://api.clickup.com/api/v2";
pub const DEFAULT_SLACK_BASE_API: &str = "https://slack.com/api";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClickUpConfig {
    pub base_api: String,
    pub token: String,
    pub folder_id: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub base_api: String,
    pub token: String,
    pub timeout: Duration,
}

impl ClickUpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_api: base_api("CLICKUP_BASE_API", DEFAULT_CLICKUP_BASE_API)?,
            token: opt_env("CLICKUP_API_KEY").ok_or(ConfigError::MissingVar("CLICKUP_API_KEY"))?,
            folder_id: opt_env("CLICKUP_FOLDER_ID"),
            timeout: http_timeout(),
        })
    }
}

impl SlackConfig {
    /// `Ok(None)` when no bot token is configured.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(token) = opt_env("SLACK_BOT_TOKEN") else {
            return Ok(None);
        };
        Ok(Some(Self {
            base_api: base_api("SLACK_BASE_API", DEFAULT_SLACK_BASE_API)?,
            token,
            timeout: http_timeout(),
        }))
    }
}

fn opt_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn base_api(var: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = opt_env(var).unwrap_or_else(|| default.to_string());
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl { var, value });
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn http_timeout() -> Duration {
    let secs = opt_env("SOURCES_HTTP_TIMEOUT_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    Duration::from_secs(secs)
}
