//! Size-bounded chunking of a merged conversation.
//!
//! Chunks borrow contiguous slices of the bundle's events, so concatenating
//! the chunks in order always reproduces `bundle.events`. Splits happen only
//! at event boundaries. An event that alone exceeds the budget gets its own
//! chunk and is cut with an elision marker when rendered.

use std::ops::Range;

use tracing::{debug, warn};

use crate::model::{ConversationBundle, ConversationEvent, EVENT_SEPARATOR, EventId};

/// Record of an oversized event cut down to fit the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub event: EventId,
    pub original_chars: usize,
    pub kept_chars: usize,
}

impl Truncation {
    pub fn elided_chars(&self) -> usize {
        self.original_chars - self.kept_chars
    }
}

/// One contiguous slice of the conversation.
#[derive(Debug, Clone)]
pub struct ConversationChunk<'a> {
    /// Zero-based position among the chunks.
    pub index: usize,
    pub total: usize,
    pub events: &'a [ConversationEvent],
    /// Range of `events` within `bundle.events`.
    pub range: Range<usize>,
    /// Rendered size including separators and any elision marker.
    pub chars: usize,
    pub truncation: Option<Truncation>,
}

impl ConversationChunk<'_> {
    pub fn elided_chars(&self) -> usize {
        self.truncation.as_ref().map_or(0, Truncation::elided_chars)
    }

    /// Rendered text of every event in the chunk.
    pub fn text(&self) -> String {
        self.render(|_| true)
    }

    /// Rendered text of the human events only; this is what the model sees.
    pub fn prompt_text(&self) -> String {
        self.render(|e| !e.is_bot)
    }

    fn render(&self, keep: impl Fn(&ConversationEvent) -> bool) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.events.len());
        for e in self.events.iter().filter(|e| keep(e)) {
            match &self.truncation {
                Some(t) if t.event == e.id => parts.push(truncate_rendered(e, t)),
                _ => parts.push(e.render()),
            }
        }
        parts.join(EVENT_SEPARATOR)
    }
}

/// Splits `bundle` into chunks of at most `max_chars` rendered characters.
///
/// Returns exactly one chunk when the whole conversation fits.
pub fn chunk(bundle: &ConversationBundle, max_chars: usize) -> Vec<ConversationChunk<'_>> {
    let max_chars = max_chars.max(1);
    let events = bundle.events.as_slice();

    if bundle.total_chars <= max_chars {
        return vec![ConversationChunk {
            index: 0,
            total: 1,
            events,
            range: 0..events.len(),
            chars: bundle.total_chars,
            truncation: None,
        }];
    }

    let mut out: Vec<ConversationChunk<'_>> = Vec::new();
    let mut start = 0usize;
    let mut acc = 0usize;

    for (i, event) in events.iter().enumerate() {
        let cost = event_cost(event);

        if cost > max_chars {
            if i > start {
                out.push(slice(events, start..i, acc, None));
            }
            let truncation = truncation_for(event, max_chars);
            let chars = truncated_cost(event, &truncation);
            warn!(
                event = %event.id,
                original_chars = truncation.original_chars,
                kept_chars = truncation.kept_chars,
                "event exceeds chunk budget; truncated"
            );
            out.push(slice(events, i..i + 1, chars, Some(truncation)));
            start = i + 1;
            acc = 0;
            continue;
        }

        if acc + cost > max_chars && i > start {
            out.push(slice(events, start..i, acc, None));
            start = i;
            acc = 0;
        }
        acc += cost;
    }
    if start < events.len() {
        out.push(slice(events, start..events.len(), acc, None));
    }

    let total = out.len();
    for c in &mut out {
        c.total = total;
    }
    for (i, c) in out.iter_mut().enumerate() {
        c.index = i;
    }

    debug!(
        chunks = total,
        max_chars,
        total_chars = bundle.total_chars,
        "conversation split into chunks"
    );
    out
}

fn slice<'a>(
    events: &'a [ConversationEvent],
    range: Range<usize>,
    chars: usize,
    truncation: Option<Truncation>,
) -> ConversationChunk<'a> {
    ConversationChunk {
        index: 0,
        total: 0,
        events: &events[range.clone()],
        range,
        chars,
        truncation,
    }
}

fn event_cost(e: &ConversationEvent) -> usize {
    e.rendered_chars() + EVENT_SEPARATOR.len()
}

fn elision_marker(elided: usize) -> String {
    format!("\n[... {elided} chars elided ...]")
}

fn truncation_for(e: &ConversationEvent, max_chars: usize) -> Truncation {
    let original = e.rendered_chars();
    // The marker can only shrink as more is kept, so sizing it for the
    // full length keeps the result within budget.
    let reserve = elision_marker(original).chars().count() + EVENT_SEPARATOR.len();
    let kept = max_chars.saturating_sub(reserve).min(original);
    Truncation {
        event: e.id.clone(),
        original_chars: original,
        kept_chars: kept,
    }
}

fn truncate_rendered(e: &ConversationEvent, t: &Truncation) -> String {
    let mut s: String = e.render().chars().take(t.kept_chars).collect();
    s.push_str(&elision_marker(t.elided_chars()));
    s
}

fn truncated_cost(e: &ConversationEvent, t: &Truncation) -> usize {
    truncate_rendered(e, t).chars().count() + EVENT_SEPARATOR.len()
}
