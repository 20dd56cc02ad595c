//! Shared LLM service with two profiles: `fast` and `slow`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (provider+endpoint+model+key+timeout).
//! - If the `slow` profile is not provided, it falls back to `fast`.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tokio::sync::RwLock;

use crate::{
    config::{default_config::config_from_env, llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::AiLlmError,
    services::{Generation, ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Shared service managing the **fast** and **slow** LLM profiles.
pub struct LlmServiceProfiles {
    fast: LlmModelConfig,
    slow: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
}

impl LlmServiceProfiles {
    /// Creates a new service.
    ///
    /// - `fast`: required fast profile.
    /// - `slow_opt`: optional quality profile. If `None`, falls back to `fast`.
    pub fn new(fast: LlmModelConfig, slow_opt: Option<LlmModelConfig>) -> Self {
        let slow = slow_opt.unwrap_or_else(|| fast.clone());
        Self {
            fast,
            slow,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
        }
    }

    /// Builds both profiles from the environment (see [`config_from_env`]).
    pub fn from_env() -> Result<Self, AiLlmError> {
        let (fast, slow) = config_from_env()?;
        Ok(Self::new(fast, slow))
    }

    /// Generates text using the **fast** profile.
    pub async fn generate_fast(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        self.generate_with(&self.fast, prompt, system).await
    }

    /// Generates text using the **slow** profile.
    pub async fn generate_slow(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        self.generate_with(&self.slow, prompt, system).await
    }

    /// Returns references to the current profiles `(fast, slow)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig) {
        (&self.fast, &self.slow)
    }

    /* --------------------- Internals --------------------- */

    async fn generate_with(
        &self,
        cfg: &LlmModelConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<Generation, AiLlmError> {
        match cfg.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(cfg).await?;
                cli.generate(prompt, system).await
            }
            LlmProvider::OpenAI => {
                let cli = self.get_or_init_openai(cfg).await?;
                cli.generate(prompt, system).await
            }
        }
    }

    async fn get_or_init_ollama(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OllamaService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn get_or_init_openai(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OpenAiService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, PartialEq, Eq)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        self.api_key.hash(state);
        self.timeout.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama(model: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: model.into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: None,
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn slow_falls_back_to_fast() {
        let svc = LlmServiceProfiles::new(ollama("small"), None);
        let (fast, slow) = svc.profiles();
        assert_eq!(fast, slow);
    }

    #[tokio::test]
    async fn clients_are_cached_per_config() {
        let svc = LlmServiceProfiles::new(ollama("small"), Some(ollama("large")));
        let a = svc.get_or_init_ollama(&svc.fast).await.unwrap();
        let b = svc.get_or_init_ollama(&svc.fast).await.unwrap();
        let c = svc.get_or_init_ollama(&svc.slow).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(svc.ollama.read().await.len(), 2);
    }
}
