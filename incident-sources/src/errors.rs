//! Error hierarchy for the tracker and chat clients.
//!
//! - One root `SourceError` for every public function
//! - HTTP status mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, ...)
//! - Slack reports failures as `{"ok": false, "error": "..."}` on HTTP 200;
//!   [`ProviderError::from_slack`] maps those codes onto the same variants

use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure talking to ClickUp or Slack.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error: status {0}")]
    Server(u16),

    #[error("http status error: {0}")]
    HttpStatus(u16),

    #[error("timeout")]
    Timeout,

    /// DNS/connect/reset without a status.
    #[error("network error: {0}")]
    Network(String),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Slack `error` code not covered by the variants above.
    #[error("slack api error: {0}")]
    SlackApi(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing env var: {0}")]
    MissingVar(&'static str),

    #[error("invalid base api url in {var}: {value}")]
    InvalidBaseUrl { var: &'static str, value: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Provider(ProviderError::from(e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            return ProviderError::from_status(status.as_u16(), None);
        }
        if e.is_decode() {
            return ProviderError::InvalidResponse(e.to_string());
        }
        ProviderError::Network(e.to_string())
    }
}

impl ProviderError {
    pub fn from_status(code: u16, retry_after_secs: Option<u64>) -> Self {
        match code {
            401 => ProviderError::Unauthorized,
            403 => ProviderError::Forbidden,
            404 => ProviderError::NotFound,
            429 => ProviderError::RateLimited { retry_after_secs },
            500..=599 => ProviderError::Server(code),
            _ => ProviderError::HttpStatus(code),
        }
    }

    /// Maps a Slack Web API `error` code.
    pub fn from_slack(code: &str) -> Self {
        match code {
            "not_authed" | "invalid_auth" | "account_inactive" | "token_revoked"
            | "token_expired" => ProviderError::Unauthorized,
            "missing_scope" | "not_in_channel" | "access_denied" => ProviderError::Forbidden,
            "channel_not_found" | "thread_not_found" | "message_not_found" | "user_not_found" => {
                ProviderError::NotFound
            }
            "ratelimited" | "rate_limited" => ProviderError::RateLimited {
                retry_after_secs: None,
            },
            "internal_error" | "fatal_error" | "service_unavailable" => ProviderError::Server(500),
            other => ProviderError::SlackApi(other.to_string()),
        }
    }

    /// The resource is gone or was never there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound)
    }
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Provider(p) if p.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_variants() {
        assert!(matches!(ProviderError::from_status(401, None), ProviderError::Unauthorized));
        assert!(matches!(
            ProviderError::from_status(429, Some(3)),
            ProviderError::RateLimited {
                retry_after_secs: Some(3)
            }
        ));
        assert!(matches!(ProviderError::from_status(503, None), ProviderError::Server(503)));
        assert!(matches!(ProviderError::from_status(418, None), ProviderError::HttpStatus(418)));
    }

    #[test]
    fn slack_codes_map_to_variants() {
        assert!(ProviderError::from_slack("thread_not_found").is_not_found());
        assert!(matches!(ProviderError::from_slack("invalid_auth"), ProviderError::Unauthorized));
        assert!(matches!(
            ProviderError::from_slack("something_new"),
            ProviderError::SlackApi(s) if s == "something_new"
        ));
        let e: SourceError = ProviderError::NotFound.into();
        assert!(e.is_not_found());
    }
}
