//! Shared LLM access for the RCA tooling.
//!
//! - [`service_profiles::LlmServiceProfiles`]: fast/slow profiles with cached clients
//! - [`services`]: thin Ollama and OpenAI clients
//! - [`error_handler`]: unified errors and env helpers
//! - [`telemetry`]: console tracing layer used by the binary

pub mod config;
pub mod error_handler;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::AiLlmError;
pub use service_profiles::LlmServiceProfiles;
pub use services::{FinishReason, Generation};
