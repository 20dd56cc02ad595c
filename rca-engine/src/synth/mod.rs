//! RCA synthesis: chunks → completion calls → four parsed sections.
//!
//! - No human conversation (or too little of it): no call, `NoConversation`
//! - One chunk with human text: one `Single` call
//! - Several: one `Partial` call per chunk, then a `Reduce` call, or a
//!   deterministic per-section concatenation when reduction is disabled or
//!   fails
//!
//! Every call is bounded by `synthesis_timeout`. A failed single or partial
//! call degrades the whole result to [`RcaResult::unavailable`]; it never
//! propagates.

pub mod completer;
pub mod parse;
pub mod prompt;

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::chunk::ConversationChunk;
use crate::config::EngineConfig;
use crate::errors::{Diagnostic, SynthesisError};
use crate::model::{ConversationBundle, FALLBACK, RcaResult, RcaSection, RcaStatus};
use crate::sources::TrackerTicket;

pub use completer::{Completer, CompletionRequest, Stage};
use parse::{Sections, format_steps, parse_sections};

/// Ticket facts included in every prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketContext {
    pub id: String,
    pub title: String,
    pub status: String,
    pub engineers: Vec<String>,
    /// Output of [`prompt::technical_digest`].
    pub digest: String,
}

impl TicketContext {
    pub fn new(ticket: &TrackerTicket, bundle: &ConversationBundle) -> Self {
        Self {
            id: ticket.id.clone(),
            title: ticket.title.clone(),
            status: ticket.status.clone(),
            engineers: bundle.engineers().into_iter().map(str::to_string).collect(),
            digest: prompt::technical_digest(bundle),
        }
    }
}

/// Synthesis output plus the conditions recovered along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub result: RcaResult,
    pub diagnostics: Vec<Diagnostic>,
}

/// Produces the RCA for one ticket's chunks.
pub async fn synthesize<C: Completer>(
    chunks: &[ConversationChunk<'_>],
    ctx: &TicketContext,
    completer: &C,
    cfg: &EngineConfig,
) -> Synthesis {
    let started = Instant::now();
    let incomplete = chunks.iter().any(|c| c.truncation.is_some());

    let texts: Vec<(usize, String, bool)> = chunks
        .iter()
        .map(|c| (c.index, c.prompt_text(), c.truncation.is_some()))
        .filter(|(_, t, _)| !t.trim().is_empty())
        .collect();
    let human_chars: usize = texts.iter().map(|(_, t, _)| t.trim().chars().count()).sum();

    if texts.is_empty() || human_chars < cfg.min_conversation_chars {
        debug!(
            ticket = %ctx.id,
            human_chars,
            "no meaningful conversation; skipping model call"
        );
        return Synthesis {
            result: RcaResult::no_conversation(&ctx.title),
            diagnostics: Vec::new(),
        };
    }

    let mut diagnostics = Vec::new();

    let sections = if texts.len() == 1 {
        let prompt = prompt::single_prompt(ctx, &texts[0].1, incomplete);
        debug!(ticket = %ctx.id, prompt_len = prompt.len(), "synth: single call");
        match call(completer, Stage::Single, &prompt, cfg.synthesis_timeout).await {
            Ok(raw) => parse_sections(&raw),
            Err(e) => return degraded(ctx, e, started),
        }
    } else {
        let total = texts.len();
        let mut partials: Vec<Sections> = Vec::with_capacity(total);
        for (i, (chunk_index, text, truncated)) in texts.iter().enumerate() {
            let prompt = prompt::partial_prompt(ctx, text, i, total, *truncated);
            debug!(
                ticket = %ctx.id,
                part = i + 1,
                total,
                chunk = chunk_index,
                prompt_len = prompt.len(),
                "synth: partial call"
            );
            match call(completer, Stage::Partial { index: i, total }, &prompt, cfg.synthesis_timeout).await {
                Ok(raw) => partials.push(parse_sections(&raw)),
                Err(e) => return degraded(ctx, e, started),
            }
        }

        if cfg.reduce_with_model {
            let prompt = prompt::reduce_prompt(ctx, &partials);
            debug!(ticket = %ctx.id, prompt_len = prompt.len(), "synth: reduce call");
            match call(completer, Stage::Reduce, &prompt, cfg.synthesis_timeout).await {
                Ok(raw) => parse_sections(&raw),
                Err(e) => {
                    warn!(ticket = %ctx.id, error = %e, "reduce call failed; concatenating partials");
                    diagnostics.push(Diagnostic::ReduceFallback(e));
                    concatenate(&partials)
                }
            }
        } else {
            concatenate(&partials)
        }
    };

    let mut result = RcaResult {
        summary: String::new(),
        debug_steps: String::new(),
        resolution_steps: String::new(),
        root_cause: String::new(),
        status: RcaStatus::Complete,
        incomplete_context: incomplete,
        missing_sections: Vec::new(),
    };
    for (section, value) in RcaSection::ALL.into_iter().zip(sections) {
        let text = match value {
            Some(v) => match section {
                RcaSection::DebugSteps | RcaSection::ResolutionSteps => format_steps(&v),
                _ => v,
            },
            None => {
                result.missing_sections.push(section);
                diagnostics.push(Diagnostic::MissingSection(section));
                FALLBACK.to_string()
            }
        };
        *result.section_mut(section) = text;
    }

    if !result.missing_sections.is_empty() {
        warn!(
            ticket = %ctx.id,
            missing = ?result.missing_sections,
            "model output lacked sections; fallback used"
        );
    }
    info!(
        ticket = %ctx.id,
        calls = if texts.len() == 1 { 1 } else { texts.len() + usize::from(cfg.reduce_with_model) },
        incomplete_context = incomplete,
        latency_ms = started.elapsed().as_millis(),
        "RCA synthesized"
    );

    Synthesis {
        result,
        diagnostics,
    }
}

async fn call<C: Completer>(
    completer: &C,
    stage: Stage,
    prompt: &str,
    limit: Duration,
) -> Result<String, SynthesisError> {
    let request = CompletionRequest {
        stage,
        system: prompt::SYSTEM_PROMPT,
        prompt,
    };
    match tokio::time::timeout(limit, completer.complete(request)).await {
        Ok(Ok(raw)) if raw.trim().is_empty() => {
            Err(SynthesisError::Provider("empty completion".to_string()))
        }
        Ok(res) => res,
        Err(_) => Err(SynthesisError::Timeout(limit)),
    }
}

fn degraded(ctx: &TicketContext, e: SynthesisError, started: Instant) -> Synthesis {
    error!(
        ticket = %ctx.id,
        error = %e,
        latency_ms = started.elapsed().as_millis(),
        "completion failed; RCA unavailable"
    );
    Synthesis {
        result: RcaResult::unavailable(e.to_string()),
        diagnostics: vec![Diagnostic::ProviderFailure(e)],
    }
}

/// Joins non-empty partial values per section, in chunk order.
fn concatenate(partials: &[Sections]) -> Sections {
    let mut out: Sections = Default::default();
    for (i, slot) in out.iter_mut().enumerate() {
        let parts: Vec<&str> = partials
            .iter()
            .filter_map(|p| p[i].as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != FALLBACK)
            .collect();
        if !parts.is_empty() {
            *slot = Some(parts.join("\n\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk;
    use crate::model::{ConversationEvent, EventId, SourceKind};
    use chrono::{TimeZone, Utc};
    use std::future::Future;
    use std::sync::Mutex;

    const FULL: &str = "Summary: checkout failed\nSteps to Debug: 1. Read logs 2. Found OOM\nSteps to Resolution: raised memory\nRoot Cause: leak in cache";

    /// Replies with a canned answer per stage and records the stages seen.
    struct Scripted {
        single: Result<String, SynthesisError>,
        partial: Result<String, SynthesisError>,
        reduce: Result<String, SynthesisError>,
        seen: Mutex<Vec<Stage>>,
    }

    impl Scripted {
        fn new(answer: &str) -> Self {
            Self {
                single: Ok(answer.to_string()),
                partial: Ok(answer.to_string()),
                reduce: Ok(answer.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Completer for Scripted {
        fn complete(
            &self,
            request: CompletionRequest<'_>,
        ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
            self.seen.lock().unwrap().push(request.stage);
            let out = match request.stage {
                Stage::Single => self.single.clone(),
                Stage::Partial { .. } => self.partial.clone(),
                Stage::Reduce => self.reduce.clone(),
            };
            async move { out }
        }
    }

    fn bundle(texts: &[(&str, bool)]) -> ConversationBundle {
        let events: Vec<ConversationEvent> = texts
            .iter()
            .enumerate()
            .map(|(i, (t, bot))| ConversationEvent {
                id: EventId::new(SourceKind::TrackerComment, &i.to_string()),
                source: SourceKind::TrackerComment,
                author: if *bot { "ClickBot".into() } else { "ann".into() },
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                text: t.to_string(),
                is_bot: *bot,
                raw_ref: i.to_string(),
                seq: i,
                attachment: None,
            })
            .collect();
        let total_chars = events.iter().map(|e| e.rendered_chars() + 2).sum();
        ConversationBundle {
            events,
            media: Vec::new(),
            total_chars,
        }
    }

    fn ctx() -> TicketContext {
        TicketContext {
            id: "T1".into(),
            title: "Checkout broken".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_chunk_makes_one_call() {
        let b = bundle(&[("Checkout returns 500 for all EU users since the deploy", false)]);
        let chunks = chunk(&b, 30_000);
        let stub = Scripted::new(FULL);
        let out = synthesize(&chunks, &ctx(), &stub, &EngineConfig::default()).await;
        assert_eq!(*stub.seen.lock().unwrap(), vec![Stage::Single]);
        assert_eq!(out.result.status, RcaStatus::Complete);
        assert_eq!(out.result.summary, "checkout failed");
        assert_eq!(out.result.debug_steps, "1. Read logs\n\n2. Found OOM");
        assert!(out.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn bot_only_conversation_skips_the_model() {
        let b = bundle(&[("ClickBot (automations) set status to in progress and more text", true)]);
        let chunks = chunk(&b, 30_000);
        let stub = Scripted::new(FULL);
        let out = synthesize(&chunks, &ctx(), &stub, &EngineConfig::default()).await;
        assert!(stub.seen.lock().unwrap().is_empty());
        assert_eq!(out.result.status, RcaStatus::NoConversation);
        assert_eq!(out.result.summary, "Checkout broken");
    }

    #[tokio::test]
    async fn multi_chunk_runs_partials_then_reduce() {
        let long = "x".repeat(400);
        let b = bundle(&[(&long, false), (&long, false), (&long, false)]);
        let chunks = chunk(&b, 500);
        assert_eq!(chunks.len(), 3);
        let stub = Scripted::new(FULL);
        let out = synthesize(&chunks, &ctx(), &stub, &EngineConfig::default()).await;
        assert_eq!(
            *stub.seen.lock().unwrap(),
            vec![
                Stage::Partial { index: 0, total: 3 },
                Stage::Partial { index: 1, total: 3 },
                Stage::Partial { index: 2, total: 3 },
                Stage::Reduce
            ]
        );
        assert_eq!(out.result.root_cause, "leak in cache");
    }

    #[tokio::test]
    async fn failed_reduce_concatenates_partials() {
        let long = "x".repeat(400);
        let b = bundle(&[(&long, false), (&long, false)]);
        let chunks = chunk(&b, 500);
        let mut stub = Scripted::new("Summary: part\nRoot Cause: cause");
        stub.reduce = Err(SynthesisError::Provider("503".into()));
        let out = synthesize(&chunks, &ctx(), &stub, &EngineConfig::default()).await;
        assert_eq!(out.result.summary, "part\n\npart");
        assert_eq!(out.result.debug_steps, FALLBACK);
        assert!(matches!(out.diagnostics[0], Diagnostic::ReduceFallback(_)));
        assert!(!out.result.analysis_unavailable());
    }

    #[tokio::test]
    async fn partial_failure_degrades_everything() {
        let long = "x".repeat(400);
        let b = bundle(&[(&long, false), (&long, false)]);
        let chunks = chunk(&b, 500);
        let mut stub = Scripted::new(FULL);
        stub.partial = Err(SynthesisError::Provider("401".into()));
        let out = synthesize(&chunks, &ctx(), &stub, &EngineConfig::default()).await;
        assert!(out.result.analysis_unavailable());
        assert_eq!(out.result.summary, FALLBACK);
    }

    #[tokio::test]
    async fn slow_completer_times_out() {
        struct Hang;
        impl Completer for Hang {
            fn complete(
                &self,
                _request: CompletionRequest<'_>,
            ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
                std::future::pending()
            }
        }

        let b = bundle(&[("The nightly export job hangs forever without output", false)]);
        let chunks = chunk(&b, 30_000);
        let cfg = EngineConfig {
            synthesis_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let out = synthesize(&chunks, &ctx(), &Hang, &cfg).await;
        assert!(out.result.analysis_unavailable());
        assert_eq!(
            out.diagnostics,
            vec![Diagnostic::ProviderFailure(SynthesisError::Timeout(Duration::from_millis(20)))]
        );
    }

    #[test]
    fn concatenation_skips_empty_and_fallback() {
        let partials: Vec<Sections> = vec![
            [Some("a".into()), None, Some(FALLBACK.into()), None],
            [Some(" b ".into()), Some("".into()), Some("fix".into()), None],
        ];
        let out = concatenate(&partials);
        assert_eq!(out[0].as_deref(), Some("a\n\nb"));
        assert_eq!(out[1], None);
        assert_eq!(out[2].as_deref(), Some("fix"));
        assert_eq!(out[3], None);
    }
}
