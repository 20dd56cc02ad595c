use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use rca_engine::chunk::chunk;
use rca_engine::media::MediaExtractor;
use rca_engine::merge::merge;
use rca_engine::normalize::normalize_ticket;
use rca_engine::sources::{ChatMessage, TrackerAttachment, TrackerComment};
use rca_engine::{
    ChatThread, Completer, CompletionRequest, Diagnostic, EngineConfig, FALLBACK, ImageCategory,
    MediaKind, RcaSection, RcaStatus, SourceKind, SynthesisError, TrackerTicket, analyze_ticket,
};

const SCREENSHOT: &str = "https://files.example.com/uploads/screenshot-login.png";

/// Always answers with the same text; counts calls.
struct Fixed {
    answer: &'static str,
    calls: AtomicUsize,
}

impl Fixed {
    fn new(answer: &'static str) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Completer for Fixed {
    fn complete(
        &self,
        _request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.to_string();
        async move { Ok(answer) }
    }
}

struct TimesOut;

impl Completer for TimesOut {
    fn complete(
        &self,
        _request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
        async { Err(SynthesisError::Timeout(std::time::Duration::from_secs(120))) }
    }
}

const ANSWER: &str = r#"{"summary": "Login failed with connection refused", "debug_steps": "1. Read the error 2. Checked the pod", "resolution_steps": "Restarted the pod", "root_cause": "Pod lost its DB connection"}"#;

fn comment(id: &str, author: &str, millis: i64, text: &str) -> TrackerComment {
    TrackerComment {
        id: id.into(),
        author: Some(author.into()),
        timestamp: Some(millis.to_string()),
        text: Some(text.into()),
        attachments: Vec::new(),
    }
}

/// Two tracker records and one chat reply cross-posting the same screenshot.
fn scenario_a() -> (TrackerTicket, ChatThread) {
    let ticket = TrackerTicket {
        id: "86abc".into(),
        title: "Login page fails".into(),
        status: "complete".into(),
        creator: Some("Dana".into()),
        created_at: Some("1700000000000".into()),
        customer: Some("Acme".into()),
        comments: vec![comment("c1", "Dana", 1_700_000_001_000, "Error: connection refused")],
        attachments: vec![TrackerAttachment {
            id: "a1".into(),
            title: Some("screenshot-login.png".into()),
            url: SCREENSHOT.into(),
            mimetype: Some("image/png".into()),
            uploaded_by: Some("Dana".into()),
            timestamp: Some("1700000002000".into()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let chat = ChatThread {
        channel: "C123".into(),
        thread_ts: "1700000003.000100".into(),
        permalink: None,
        messages: vec![ChatMessage {
            ts: Some("1700000003.000100".into()),
            user: Some("Eli".into()),
            text: Some(format!("fixed by restarting pod, see {SCREENSHOT}")),
            is_bot: false,
            files: Vec::new(),
        }],
    };
    (ticket, chat)
}

#[tokio::test]
async fn scenario_a_three_events_one_image_one_chunk() {
    let (ticket, chat) = scenario_a();
    let cfg = EngineConfig::default();
    let stub = Fixed::new(ANSWER);

    let out = analyze_ticket(&ticket, Some(&chat), &stub, &cfg).await;

    assert_eq!(out.bundle.events.len(), 3);
    assert_eq!(
        out.bundle.events.iter().map(|e| e.source).collect::<Vec<_>>(),
        vec![
            SourceKind::TrackerComment,
            SourceKind::TrackerAttachment,
            SourceKind::ChatMessage
        ]
    );
    assert_eq!(out.bundle.media.len(), 1);
    let image = &out.bundle.media[0];
    assert_eq!(image.kind, MediaKind::Image);
    assert_eq!(image.source, SourceKind::TrackerAttachment);
    assert_eq!(image.image_category(), Some(ImageCategory::Screenshot));
    assert_eq!(out.chunks, 1);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.result.status, RcaStatus::Complete);
    assert_eq!(out.result.root_cause, "Pod lost its DB connection");
    assert_eq!(out.result.debug_steps, "1. Read the error\n\n2. Checked the pod");
}

#[tokio::test]
async fn scenario_b_large_conversation_splits_in_two() {
    let comments: Vec<TrackerComment> = (0..10)
        .map(|i| {
            let body: String = std::iter::repeat(char::from(b'a' + i as u8)).take(4_400).collect();
            comment(&format!("c{i}"), "Sam", 1_700_000_000_000 + i * 60_000, &body)
        })
        .collect();
    let ticket = TrackerTicket {
        id: "big".into(),
        title: "Long investigation".into(),
        comments,
        ..Default::default()
    };
    let cfg = EngineConfig {
        max_chars: 30_000,
        ..Default::default()
    };

    let normalized = normalize_ticket(&ticket, None, &cfg.bots);
    let bundle = merge([normalized.tracker], &MediaExtractor::from_config(&cfg));
    assert!(bundle.total_chars > 44_000 && bundle.total_chars < 46_000);

    let chunks = chunk(&bundle, cfg.max_chars);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.truncation.is_none() && c.chars <= 30_000));
    let rebuilt: Vec<_> = chunks.iter().flat_map(|c| c.events.iter().cloned()).collect();
    assert_eq!(rebuilt, bundle.events);

    let stub = Fixed::new(ANSWER);
    let out = analyze_ticket(&ticket, None, &stub, &cfg).await;
    assert_eq!(out.chunks, 2);
    // two partials plus the reduce call
    assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn scenario_c_timeout_degrades_without_failing() {
    let (ticket, chat) = scenario_a();
    let out = analyze_ticket(&ticket, Some(&chat), &TimesOut, &EngineConfig::default()).await;

    assert!(out.result.analysis_unavailable());
    for section in RcaSection::ALL {
        assert_eq!(out.result.section(section), FALLBACK);
    }
    assert!(
        out.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::ProviderFailure(SynthesisError::Timeout(_))))
    );
    assert_eq!(out.bundle.media.len(), 1);
}

#[test]
fn merge_is_independent_of_source_order() {
    let (ticket, chat) = scenario_a();
    let cfg = EngineConfig::default();
    let extractor = MediaExtractor::from_config(&cfg);

    let a = normalize_ticket(&ticket, Some(&chat), &cfg.bots);
    let b = normalize_ticket(&ticket, Some(&chat), &cfg.bots);
    let forward = merge([a.tracker, a.chat], &extractor);
    let backward = merge([b.chat, b.tracker], &extractor);

    assert_eq!(forward, backward);
    assert!(
        forward
            .events
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    );
}

#[test]
fn equal_timestamps_put_tracker_first() {
    let (mut ticket, mut chat) = scenario_a();
    ticket.comments[0].timestamp = Some("1700000005000".into());
    ticket.attachments.clear();
    chat.messages[0].ts = Some("1700000005".into());
    let cfg = EngineConfig::default();

    let n = normalize_ticket(&ticket, Some(&chat), &cfg.bots);
    let bundle = merge([n.chat, n.tracker], &MediaExtractor::from_config(&cfg));
    assert_eq!(bundle.events[0].source, SourceKind::TrackerComment);
    assert_eq!(bundle.events[1].source, SourceKind::ChatMessage);
}

#[test]
fn media_dedup_keys_are_unique() {
    let (mut ticket, chat) = scenario_a();
    ticket.comments.push(comment(
        "c2",
        "Dana",
        1_700_000_004_000,
        "see https://grafana.example.com/d/api and https://grafana.example.com/d/api/ again\n```\nkubectl get pods\n```",
    ));
    ticket.comments.push(comment(
        "c3",
        "Eli",
        1_700_000_005_000,
        "same thing:\n```sh\nkubectl get pods\n```",
    ));
    let cfg = EngineConfig::default();
    let n = normalize_ticket(&ticket, Some(&chat), &cfg.bots);
    let bundle = merge([n.tracker, n.chat], &MediaExtractor::from_config(&cfg));

    let keys: HashSet<&str> = bundle.media.iter().map(|m| m.dedup_key.as_str()).collect();
    assert_eq!(keys.len(), bundle.media.len());
    assert_eq!(bundle.media_summary().dashboard_links, 1);
    assert_eq!(bundle.media_summary().code_snippets, 1);
    for item in &bundle.media {
        assert!(bundle.event(&item.source_event).is_some());
    }
}

#[tokio::test]
async fn analysis_is_idempotent_with_a_deterministic_completer() {
    let (ticket, chat) = scenario_a();
    let cfg = EngineConfig::default();
    let stub = Fixed::new(ANSWER);

    let first = analyze_ticket(&ticket, Some(&chat), &stub, &cfg).await;
    let second = analyze_ticket(&ticket, Some(&chat), &stub, &cfg).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn missing_root_cause_falls_back_alone() {
    let (ticket, chat) = scenario_a();
    let stub = Fixed::new(
        "Summary: Login failed\nSteps to Debug: Read the logs\nSteps to Resolution: Restarted the pod",
    );
    let out = analyze_ticket(&ticket, Some(&chat), &stub, &EngineConfig::default()).await;

    assert_eq!(out.result.status, RcaStatus::Complete);
    assert_eq!(out.result.summary, "Login failed");
    assert_eq!(out.result.resolution_steps, "Restarted the pod");
    assert_eq!(out.result.root_cause, FALLBACK);
    assert_eq!(out.result.missing_sections, vec![RcaSection::RootCause]);
    assert!(
        out.diagnostics
            .contains(&Diagnostic::MissingSection(RcaSection::RootCause))
    );
}

#[tokio::test]
async fn bad_records_are_skipped_and_reported() {
    let (mut ticket, chat) = scenario_a();
    ticket.comments.push(TrackerComment {
        id: "broken".into(),
        author: None,
        timestamp: Some("1700000009000".into()),
        text: Some("orphan".into()),
        attachments: Vec::new(),
    });
    let out = analyze_ticket(&ticket, Some(&chat), &Fixed::new(ANSWER), &EngineConfig::default()).await;

    assert_eq!(out.bundle.events.len(), 3);
    assert!(
        out.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::SkippedRecord(_)))
    );
}
