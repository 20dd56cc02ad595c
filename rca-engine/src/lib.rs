//! Conversation aggregation and RCA synthesis for support tickets.
//!
//! One ticket flows through four stages:
//!
//! 1) **Normalize** tracker comments, attachments, chat messages and files
//!    into [`ConversationEvent`]s (bad records are skipped and reported)
//! 2) **Merge** per-source events into one chronological timeline and
//!    extract deduplicated media with provenance
//! 3) **Chunk** the timeline into size-bounded, event-aligned segments
//! 4) **Synthesize** a four-section RCA through a [`Completer`], degrading to
//!    a fallback result instead of failing
//!
//! [`analyze_ticket`] runs all four. The crate does no I/O besides the
//! completion calls; fetching and report rendering live in the binary and
//! in `incident-sources`.

pub mod chunk;
pub mod config;
pub mod errors;
pub mod media;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod sources;
pub mod synth;

pub use config::EngineConfig;
pub use errors::{Diagnostic, SourceDataError, SynthesisError};
pub use model::{
    ConversationBundle, ConversationEvent, FALLBACK, ImageCategory, LinkCategory, MediaItem,
    MediaKind, MediaSummary, RcaResult, RcaSection, RcaStatus, SourceKind,
};
pub use pipeline::{TicketAnalysis, analyze_ticket};
pub use sources::{ChatThread, TrackerTicket};
pub use synth::{Completer, CompletionRequest, Stage};
