//! The completion seam between the synthesizer and an LLM backend.
//!
//! Plain trait with an `impl Future` return; dispatch stays static.

use std::future::Future;
use std::sync::Arc;

use ai_llm_service::{AiLlmError, LlmServiceProfiles};
use tracing::warn;

use crate::errors::SynthesisError;

/// Which step of synthesis a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The whole conversation fit in one chunk.
    Single,
    /// Partial analysis of chunk `index` (zero-based) out of `total`.
    Partial { index: usize, total: usize },
    /// Merge of partial analyses into the final RCA.
    Reduce,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub stage: Stage,
    pub system: &'a str,
    pub prompt: &'a str,
}

/// Anything that turns a prompt into free-form text.
pub trait Completer {
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send;
}

impl From<AiLlmError> for SynthesisError {
    fn from(e: AiLlmError) -> Self {
        match e {
            AiLlmError::Timeout(d) => SynthesisError::Timeout(d),
            other => SynthesisError::Provider(other.to_string()),
        }
    }
}

/// Partials go to the fast profile; single and reduce calls to the slow one.
/// A reply cut off at the token limit is still returned; the section parser
/// keeps whatever arrived.
impl Completer for LlmServiceProfiles {
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
        async move {
            let out = match request.stage {
                Stage::Partial { .. } => {
                    self.generate_fast(request.prompt, Some(request.system)).await
                }
                Stage::Single | Stage::Reduce => {
                    self.generate_slow(request.prompt, Some(request.system)).await
                }
            };
            let generation = out.map_err(SynthesisError::from)?;
            if generation.truncated() {
                warn!(
                    stage = ?request.stage,
                    chars = generation.text.chars().count(),
                    "completion hit the token limit; sections may be cut short"
                );
            }
            Ok(generation.text)
        }
    }
}

impl<C> Completer for Arc<C>
where
    C: Completer + Send + Sync,
{
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
        (**self).complete(request)
    }
}
