pub mod ollama_service;
pub mod open_ai_service;

use std::time::Duration;

use tracing::error;

use crate::error_handler::{
    AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
};

/// Why the model stopped producing tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the answer, or the provider did not say.
    Stop,
    /// The `max_tokens` / `num_predict` budget ran out mid-answer.
    Length,
    Other(String),
}

impl FinishReason {
    /// Maps OpenAI `finish_reason` and Ollama `done_reason` values.
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

/// Generated text plus how the generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub finish: FinishReason,
}

impl Generation {
    /// True when the answer was cut off by the token budget.
    pub fn truncated(&self) -> bool {
        self.finish == FinishReason::Length
    }
}

/// Validates an `http(s)://` endpoint and returns it without trailing slashes.
pub(crate) fn base_url(provider: Provider, endpoint: &str) -> Result<String, AiLlmError> {
    let trimmed = endpoint.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::InvalidEndpoint(endpoint.to_string()),
        )
        .into());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// HTTP client with the profile timeout (60 s when unset).
pub(crate) fn http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client, AiLlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.unwrap_or(60)))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(AiLlmError::HttpTransport)
}

/// Turns a non-success response into a provider error, logging a body snippet.
pub(crate) async fn status_error(
    provider: Provider,
    url: &str,
    resp: reqwest::Response,
) -> AiLlmError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let snippet = make_snippet(&text);
    error!(%status, %url, %snippet, provider = %provider, "LLM endpoint returned non-success status");
    ProviderError::new(
        provider,
        ProviderErrorKind::HttpStatus(HttpError {
            status,
            url: url.to_string(),
            snippet,
        }),
    )
    .into()
}
