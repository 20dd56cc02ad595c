use crate::config::llm_provider::LlmProvider;

/// Configuration for one LLM model profile.
///
/// # Fields
///
/// - `provider`: backend (Ollama or OpenAI).
/// - `model`: model identifier (e.g., `"gpt-4o"`, `"qwen3:14b"`).
/// - `endpoint`: base URL of the inference server, without the API path.
/// - `api_key`: optional key for providers that require authentication.
/// - `max_tokens`: maximum number of tokens to generate.
/// - `temperature`: sampling temperature.
/// - `top_p`: nucleus sampling cutoff.
/// - `timeout_secs`: HTTP request timeout in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub timeout_secs: Option<u64>,
}
