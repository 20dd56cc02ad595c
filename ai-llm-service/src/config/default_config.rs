//! Default LLM configs loaded from environment variables.
//!
//! Two roles exist for each provider:
//!
//! - **Slow**: the quality model used for the final RCA write-up
//! - **Fast**: a cheaper model used for per-chunk partial analyses
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND` = provider kind (`ollama` or `openai`, default `openai`)
//! - `LLM_MAX_TOKENS` = optional max tokens (u32, default 4000)
//! - `LLM_TIMEOUT_SECS` = optional HTTP timeout (u64, default 120)
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL`                = slow/quality model (mandatory)
//! - `OLLAMA_MODEL_FAST`           = fast model (optional, falls back to slow)
//!
//! OpenAI-specific:
//! - `OPENAI_API_KEY`    (mandatory)
//! - `OPENAI_MODEL`      (default `gpt-4o`)
//! - `OPENAI_MODEL_FAST` (optional, falls back to slow)
//! - `OPENAI_URL`        (default `https://api.openai.com`)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt_u32, env_opt_u64, must_env, opt_env,
        validate_http_endpoint,
    },
};

const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// RCA write-ups should be factual; keep sampling nearly greedy.
const RCA_TEMPERATURE: f32 = 0.1;

/// Reads `LLM_KIND` and builds the `(fast, slow)` pair for that provider.
///
/// `slow` is `None` when no dedicated fast model is configured, in which
/// case both roles share one profile.
pub fn config_from_env() -> Result<(LlmModelConfig, Option<LlmModelConfig>), AiLlmError> {
    let provider = match opt_env("LLM_KIND") {
        Some(kind) => kind.parse::<LlmProvider>()?,
        None => LlmProvider::OpenAI,
    };

    match provider {
        LlmProvider::Ollama => {
            let slow = config_ollama_slow()?;
            Ok(match config_ollama_fast()? {
                Some(fast) => (fast, Some(slow)),
                None => (slow, None),
            })
        }
        LlmProvider::OpenAI => {
            let slow = config_openai_slow()?;
            Ok(match config_openai_fast()? {
                Some(fast) => (fast, Some(slow)),
                None => (slow, None),
            })
        }
    }
}

/// Resolves the Ollama endpoint.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Some(url) = opt_env("OLLAMA_URL") {
        validate_http_endpoint("OLLAMA_URL", &url)?;
        return Ok(url);
    }
    if let Some(port) = opt_env("OLLAMA_PORT") {
        port.trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{}", port.trim()));
    }
    Err(ConfigError::MissingVar("OLLAMA_URL or OLLAMA_PORT").into())
}

fn common_limits() -> Result<(u32, u64), AiLlmError> {
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?.unwrap_or(DEFAULT_MAX_TOKENS);
    let timeout = env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
    Ok((max_tokens, timeout))
}

/// Slow/quality Ollama model from `OLLAMA_MODEL`.
pub fn config_ollama_slow() -> Result<LlmModelConfig, AiLlmError> {
    let endpoint = ollama_endpoint()?;
    let model = must_env("OLLAMA_MODEL")?;
    let (max_tokens, timeout) = common_limits()?;

    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model,
        endpoint,
        api_key: None,
        max_tokens: Some(max_tokens),
        temperature: Some(RCA_TEMPERATURE),
        top_p: None,
        timeout_secs: Some(timeout),
    })
}

/// Fast Ollama model from `OLLAMA_MODEL_FAST`, if configured.
pub fn config_ollama_fast() -> Result<Option<LlmModelConfig>, AiLlmError> {
    let Some(model) = opt_env("OLLAMA_MODEL_FAST") else {
        return Ok(None);
    };
    let endpoint = ollama_endpoint()?;
    let (max_tokens, timeout) = common_limits()?;

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model,
        endpoint,
        api_key: None,
        max_tokens: Some(max_tokens),
        temperature: Some(RCA_TEMPERATURE),
        top_p: Some(0.9),
        timeout_secs: Some(timeout),
    }))
}

fn openai_endpoint() -> Result<String, AiLlmError> {
    let url = opt_env("OPENAI_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
    validate_http_endpoint("OPENAI_URL", &url)?;
    Ok(url)
}

/// Slow/quality OpenAI model (`OPENAI_MODEL`, default `gpt-4o`).
pub fn config_openai_slow() -> Result<LlmModelConfig, AiLlmError> {
    let api_key = must_env("OPENAI_API_KEY")?;
    let endpoint = openai_endpoint()?;
    let model = opt_env("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
    let (max_tokens, timeout) = common_limits()?;

    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint,
        api_key: Some(api_key),
        max_tokens: Some(max_tokens),
        temperature: Some(RCA_TEMPERATURE),
        top_p: None,
        timeout_secs: Some(timeout),
    })
}

/// Fast OpenAI model from `OPENAI_MODEL_FAST`, if configured.
pub fn config_openai_fast() -> Result<Option<LlmModelConfig>, AiLlmError> {
    let Some(model) = opt_env("OPENAI_MODEL_FAST") else {
        return Ok(None);
    };
    let api_key = must_env("OPENAI_API_KEY")?;
    let endpoint = openai_endpoint()?;
    let (max_tokens, timeout) = common_limits()?;

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint,
        api_key: Some(api_key),
        max_tokens: Some(max_tokens),
        temperature: Some(RCA_TEMPERATURE),
        top_p: None,
        timeout_secs: Some(timeout),
    }))
}
