//! Error and diagnostic types for the RCA engine.
//!
//! Nothing in the per-ticket pipeline is fatal. Malformed records, oversized
//! events, provider failures and unparseable model output are all recovered
//! locally and reported as [`Diagnostic`] entries next to the result.
//! The error enums below are what the individual stages return before the
//! pipeline folds them into diagnostics.

use std::time::Duration;

use thiserror::Error;

use crate::model::{EventId, RcaSection};

/// A source record could not be normalized into a conversation event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceDataError {
    #[error("record {raw_ref} has no author")]
    MissingAuthor { raw_ref: String },

    #[error("record {raw_ref} has no timestamp")]
    MissingTimestamp { raw_ref: String },

    #[error("record {raw_ref} has an unparseable timestamp: {value}")]
    InvalidTimestamp { raw_ref: String, value: String },
}

/// Failure of one completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// The provider returned an error (HTTP status, transport, decode).
    #[error("completion provider failed: {0}")]
    Provider(String),

    /// The call did not finish within the configured bound.
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    /// No completion backend is configured for this run.
    #[error("AI analysis disabled")]
    Disabled,
}

/// Invalid engine configuration read from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("invalid boolean in {var}: {value}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// A locally recovered condition worth surfacing in logs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A record was dropped during normalization.
    SkippedRecord(SourceDataError),

    /// A single event exceeded the chunk budget and was truncated.
    ChunkOverflow {
        event: EventId,
        original_chars: usize,
        kept_chars: usize,
    },

    /// A completion call failed; the result is degraded.
    ProviderFailure(SynthesisError),

    /// The model output did not contain this section.
    MissingSection(RcaSection),

    /// The reduce call failed and partials were concatenated instead.
    ReduceFallback(SynthesisError),
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::SkippedRecord(e) => write!(f, "skipped record: {e}"),
            Diagnostic::ChunkOverflow {
                event,
                original_chars,
                kept_chars,
            } => write!(
                f,
                "event {event} truncated from {original_chars} to {kept_chars} chars"
            ),
            Diagnostic::ProviderFailure(e) => write!(f, "analysis unavailable: {e}"),
            Diagnostic::MissingSection(s) => write!(f, "model output lacked section '{s}'"),
            Diagnostic::ReduceFallback(e) => {
                write!(f, "reduce call failed, sections concatenated: {e}")
            }
        }
    }
}
