//! Non-streaming client for OpenAI-compatible `POST /v1/chat/completions`.
//!
//! The API key goes out as a bearer token on each request. The first choice
//! with content wins; its `finish_reason` tells the caller whether the answer
//! hit the `max_tokens` budget.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{FinishReason, Generation, base_url, http_client, status_error};
use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, Provider, ProviderError, ProviderErrorKind},
};

#[derive(Debug)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    api_key: String,
    url_chat: String,
}

impl OpenAiService {
    /// # Errors
    /// Wrong provider, missing API key, a non-http endpoint, or a client
    /// that cannot be built.
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::OpenAI {
            return Err(
                ProviderError::new(Provider::OpenAI, ProviderErrorKind::InvalidProvider).into(),
            );
        }
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::new(Provider::OpenAI, ProviderErrorKind::MissingApiKey))?;

        let url_chat = format!("{}/v1/chat/completions", base_url(Provider::OpenAI, &cfg.endpoint)?);
        let client = http_client(cfg.timeout_secs)?;
        debug!(model = %cfg.model, url = %url_chat, "openai client ready");

        Ok(Self {
            client,
            cfg,
            api_key,
            url_chat,
        })
    }

    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        let started = Instant::now();
        let body = ChatCompletionRequest::from_cfg(&self.cfg, prompt, system);

        debug!(prompt_len = prompt.len(), "POST {}", self.url_chat);
        let resp = self
            .client
            .post(&self.url_chat)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(Provider::OpenAI, &self.url_chat, resp).await);
        }

        let out: ChatCompletionResponse = resp.json().await.map_err(|e| {
            ProviderError::new(Provider::OpenAI, ProviderErrorKind::Decode(e.to_string()))
        })?;
        let generation = out
            .into_generation()
            .ok_or_else(|| ProviderError::new(Provider::OpenAI, ProviderErrorKind::EmptyChoices))?;

        if generation.truncated() {
            warn!(
                max_tokens = ?self.cfg.max_tokens,
                "chat completion stopped at the token limit"
            );
        }
        info!(
            latency_ms = started.elapsed().as_millis(),
            finish = ?generation.finish,
            "chat completion completed"
        );
        Ok(generation)
    }
}

/* ===========================================================================
HTTP payloads
======================================================================== */

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_cfg(cfg: &'a LlmModelConfig, prompt: &'a str, system: Option<&'a str>) -> Self {
        let messages = system
            .map(|content| ChatMessage {
                role: "system",
                content,
            })
            .into_iter()
            .chain(std::iter::once(ChatMessage {
                role: "user",
                content: prompt,
            }))
            .collect();

        Self {
            model: &cfg.model,
            messages,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_generation(self) -> Option<Generation> {
        self.choices.into_iter().find_map(|choice| {
            let text = choice.message.content.filter(|c| !c.trim().is_empty())?;
            Some(Generation {
                text,
                finish: FinishReason::from_provider(choice.finish_reason.as_deref()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(api_key: Option<&str>) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "gpt-4o".into(),
            endpoint: "https://api.openai.com/".into(),
            api_key: api_key.map(str::to_string),
            max_tokens: Some(4000),
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn missing_or_blank_key_is_rejected() {
        let err = OpenAiService::new(cfg(None)).unwrap_err();
        assert!(err.to_string().contains("missing API key"));
        assert!(OpenAiService::new(cfg(Some("  "))).is_err());
    }

    #[test]
    fn chat_url_is_built_from_endpoint() {
        let svc = OpenAiService::new(cfg(Some("sk-test"))).unwrap();
        assert_eq!(svc.url_chat, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn system_message_goes_first() {
        let c = cfg(Some("sk-test"));
        let req = ChatCompletionRequest::from_cfg(&c, "analyze", Some("you are an engineer"));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "analyze");
        assert_eq!(v["max_tokens"], 4000);
        assert!(v.get("top_p").is_none());
    }

    #[test]
    fn first_choice_with_content_is_used() {
        let raw = r#"{"choices":[{"message":{"content":null},"finish_reason":"stop"},{"message":{"content":"ok"},"finish_reason":"stop"}]}"#;
        let out: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let generation = out.into_generation().unwrap();
        assert_eq!(generation.text, "ok");
        assert!(!generation.truncated());
    }

    #[test]
    fn length_finish_marks_truncation() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"{\"summary\": \"DB do"},"finish_reason":"length"}]}"#;
        let out: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let generation = out.into_generation().unwrap();
        assert!(generation.truncated());
        assert_eq!(generation.text, r#"{"summary": "DB do"#);
    }

    #[test]
    fn no_usable_choice() {
        let out: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(out.into_generation().is_none());
    }
}
