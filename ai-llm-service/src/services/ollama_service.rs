//! Thin Ollama client for text generation.
//!
//! - `POST {endpoint}/api/generate` with `stream=false`
//!
//! The system instruction is sent through Ollama's top-level `system` field.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{FinishReason, Generation, base_url, http_client, status_error};
use crate::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
use crate::error_handler::{AiLlmError, Provider, ProviderError, ProviderErrorKind};

/// Thin client for Ollama.
///
/// Reuses one HTTP client with a configurable timeout.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not `Ollama`
    /// - `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(
                ProviderError::new(Provider::Ollama, ProviderErrorKind::InvalidProvider).into(),
            );
        }
        let url_generate = format!("{}/api/generate", base_url(Provider::Ollama, &cfg.endpoint)?);
        let client = http_client(cfg.timeout_secs)?;

        Ok(Self {
            client,
            cfg,
            url_generate,
        })
    }

    /// Performs a non-streaming generation request via `/api/generate`.
    ///
    /// Mapped options:
    /// - `model`        ← `self.cfg.model`
    /// - `num_predict`  ← `self.cfg.max_tokens`
    /// - `temperature`  ← `self.cfg.temperature`
    /// - `top_p`        ← `self.cfg.top_p`
    ///
    /// `done_reason: "length"` means `num_predict` ran out mid-answer.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        let started = Instant::now();
        let body = GenerateRequest::from_cfg(&self.cfg, prompt, system);

        debug!(prompt_len = prompt.len(), "POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(Provider::Ollama, &self.url_generate, resp).await);
        }

        let out: GenerateResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::Decode(format!(
                    "serde error: {e}; ensure `stream=false` is used"
                )),
            )
        })?;
        let generation = out.into_generation();

        if generation.truncated() {
            warn!(
                num_predict = ?self.cfg.max_tokens,
                "ollama generation stopped at the token limit"
            );
        }
        info!(
            latency_ms = started.elapsed().as_millis(),
            finish = ?generation.finish,
            "ollama generation completed"
        );
        Ok(generation)
    }
}

/* ==========================
HTTP payloads & options
========================== */

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

impl<'a> GenerateRequest<'a> {
    fn from_cfg(cfg: &'a LlmModelConfig, prompt: &'a str, system: Option<&'a str>) -> Self {
        let options = GenerateOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_predict: cfg.max_tokens,
        };

        Self {
            model: &cfg.model,
            prompt,
            system,
            stream: false,
            options: Some(options),
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

impl GenerateResponse {
    fn into_generation(self) -> Generation {
        Generation {
            finish: FinishReason::from_provider(self.done_reason.as_deref()),
            text: self.response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(provider: LlmProvider, endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider,
            model: "qwen3:14b".into(),
            endpoint: endpoint.into(),
            api_key: None,
            max_tokens: Some(4000),
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn rejects_wrong_provider_and_bad_endpoint() {
        assert!(OllamaService::new(cfg(LlmProvider::OpenAI, "http://localhost:11434")).is_err());
        assert!(OllamaService::new(cfg(LlmProvider::Ollama, "localhost:11434")).is_err());
    }

    #[test]
    fn request_carries_system_and_options() {
        let c = cfg(LlmProvider::Ollama, "http://localhost:11434/");
        let req = GenerateRequest::from_cfg(&c, "hello", Some("be brief"));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["system"], "be brief");
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["num_predict"], 4000);
        assert!(v["options"].get("top_p").is_none());
    }

    #[test]
    fn done_reason_length_marks_truncation() {
        let raw = r#"{"model":"qwen3:14b","response":"Summary: DB do","done":true,"done_reason":"length"}"#;
        let out: GenerateResponse = serde_json::from_str(raw).unwrap();
        let generation = out.into_generation();
        assert!(generation.truncated());
        assert_eq!(generation.text, "Summary: DB do");

        let raw = r#"{"response":"ok","done":true}"#;
        let out: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(out.into_generation().finish, FinishReason::Stop);
    }
}
