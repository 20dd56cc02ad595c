//! Per-ticket pipeline: normalize → merge → chunk → synthesize.

use std::time::Instant;

use tracing::{debug, info};

use crate::chunk::chunk;
use crate::config::EngineConfig;
use crate::errors::Diagnostic;
use crate::media::MediaExtractor;
use crate::merge::merge;
use crate::model::{ConversationBundle, RcaResult};
use crate::normalize::normalize_ticket;
use crate::sources::{ChatThread, TrackerTicket};
use crate::synth::{Completer, TicketContext, synthesize};

/// Everything the report needs for one analyzed ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketAnalysis {
    pub bundle: ConversationBundle,
    pub result: RcaResult,
    /// Number of chunks the conversation was split into.
    pub chunks: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the whole engine for one ticket. Never fails; problems end up in
/// `diagnostics` and, for provider failures, in the result status.
pub async fn analyze_ticket<C: Completer>(
    ticket: &TrackerTicket,
    chat: Option<&ChatThread>,
    completer: &C,
    cfg: &EngineConfig,
) -> TicketAnalysis {
    let t0 = Instant::now();
    let mut diagnostics = Vec::new();

    // ---------------------------
    // Stage 1: normalize sources
    // ---------------------------
    let t1 = Instant::now();
    let normalized = normalize_ticket(ticket, chat, &cfg.bots);
    debug!(
        ticket = %ticket.id,
        "stage1: normalize done, tracker={} chat={} skipped={} ({} ms)",
        normalized.tracker.len(),
        normalized.chat.len(),
        normalized.skipped.len(),
        t1.elapsed().as_millis()
    );
    diagnostics.extend(normalized.skipped.into_iter().map(Diagnostic::SkippedRecord));

    // ---------------------------
    // Stage 2: merge + media
    // ---------------------------
    let t2 = Instant::now();
    let extractor = MediaExtractor::from_config(cfg);
    let bundle = merge([normalized.tracker, normalized.chat], &extractor);
    debug!(
        ticket = %ticket.id,
        "stage2: merge done, events={} media={} chars={} ({} ms)",
        bundle.events.len(),
        bundle.media.len(),
        bundle.total_chars,
        t2.elapsed().as_millis()
    );

    // ---------------------------
    // Stage 3: chunk
    // ---------------------------
    let chunks = chunk(&bundle, cfg.max_chars);
    diagnostics.extend(chunks.iter().filter_map(|c| c.truncation.as_ref()).map(|t| {
        Diagnostic::ChunkOverflow {
            event: t.event.clone(),
            original_chars: t.original_chars,
            kept_chars: t.kept_chars,
        }
    }));
    debug!(ticket = %ticket.id, "stage3: chunk done, chunks={}", chunks.len());

    // ---------------------------
    // Stage 4: synthesize
    // ---------------------------
    let t4 = Instant::now();
    let ctx = TicketContext::new(ticket, &bundle);
    let synthesis = synthesize(&chunks, &ctx, completer, cfg).await;
    debug!(
        ticket = %ticket.id,
        "stage4: synthesis done, status={:?} ({} ms)",
        synthesis.result.status,
        t4.elapsed().as_millis()
    );
    diagnostics.extend(synthesis.diagnostics);

    let chunk_count = chunks.len();
    drop(chunks);

    info!(
        ticket = %ticket.id,
        events = bundle.events.len(),
        media = bundle.media.len(),
        chunks = chunk_count,
        diagnostics = diagnostics.len(),
        latency_ms = t0.elapsed().as_millis(),
        "ticket analyzed"
    );

    TicketAnalysis {
        bundle,
        result: synthesis.result,
        chunks: chunk_count,
        diagnostics,
    }
}
