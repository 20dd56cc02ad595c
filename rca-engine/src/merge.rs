//! Merging per-source events into one ordered conversation.
//!
//! Events are sorted by a total key so the result does not depend on the
//! order the source lists arrive in:
//! `(timestamp, source priority, seq, source kind, raw_ref)`.
//! Conversational text is never deduplicated; media is, by `dedup_key`,
//! and the first item in chronological order keeps its provenance.

use std::collections::HashSet;

use tracing::debug;

use crate::media::MediaExtractor;
use crate::model::{ConversationBundle, ConversationEvent, EVENT_SEPARATOR};

/// Builds a [`ConversationBundle`] from any number of per-source event lists.
pub fn merge<I>(per_source: I, extractor: &MediaExtractor<'_>) -> ConversationBundle
where
    I: IntoIterator<Item = Vec<ConversationEvent>>,
{
    let mut events: Vec<ConversationEvent> = per_source.into_iter().flatten().collect();
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.source.priority().cmp(&b.source.priority()))
            .then_with(|| a.seq.cmp(&b.seq))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.raw_ref.cmp(&b.raw_ref))
    });

    let mut seen: HashSet<String> = HashSet::new();
    let mut media = Vec::new();
    let mut duplicates = 0usize;
    for event in &events {
        for item in extractor.extract(event) {
            if seen.insert(item.dedup_key.clone()) {
                media.push(item);
            } else {
                duplicates += 1;
            }
        }
    }

    let total_chars = events
        .iter()
        .map(|e| e.rendered_chars() + EVENT_SEPARATOR.len())
        .sum();

    debug!(
        events = events.len(),
        media = media.len(),
        duplicate_media = duplicates,
        total_chars,
        "merged conversation"
    );

    ConversationBundle {
        events,
        media,
        total_chars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassificationRules;
    use crate::model::{Attachment, EventId, MediaKind, SourceKind};
    use chrono::{TimeZone, Utc};

    fn ev(source: SourceKind, raw: &str, secs: i64, seq: usize, text: &str) -> ConversationEvent {
        ConversationEvent {
            id: EventId::new(source, raw),
            source,
            author: "ann".into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            text: text.into(),
            is_bot: false,
            raw_ref: raw.into(),
            seq,
            attachment: None,
        }
    }

    #[test]
    fn tracker_wins_timestamp_ties() {
        let rules = ClassificationRules::default();
        let ex = MediaExtractor::new(&rules, 120);
        let chat = vec![ev(SourceKind::ChatMessage, "m1", 10, 0, "same")];
        let tracker = vec![ev(SourceKind::TrackerComment, "c1", 10, 0, "same")];
        let b = merge([chat, tracker], &ex);
        assert_eq!(b.events.len(), 2);
        assert_eq!(b.events[0].source, SourceKind::TrackerComment);
        assert_eq!(b.events[1].source, SourceKind::ChatMessage);
    }

    #[test]
    fn fetch_order_breaks_same_source_ties() {
        let rules = ClassificationRules::default();
        let ex = MediaExtractor::new(&rules, 120);
        let tracker = vec![
            ev(SourceKind::TrackerComment, "b", 5, 1, "second"),
            ev(SourceKind::TrackerComment, "a", 5, 0, "first"),
        ];
        let b = merge([tracker], &ex);
        assert_eq!(b.events[0].text, "first");
    }

    #[test]
    fn media_dedup_keeps_first_chronological_provenance() {
        let rules = ClassificationRules::default();
        let ex = MediaExtractor::new(&rules, 120);
        let mut att = ev(SourceKind::TrackerAttachment, "a1", 2, 1, "");
        att.attachment = Some(Attachment {
            url: "https://cdn.example.com/shot.png".into(),
            name: Some("shot.png".into()),
            mimetype: Some("image/png".into()),
            thumb_url: None,
        });
        let chat = ev(SourceKind::ChatMessage, "m1", 3, 0, "same https://CDN.example.com/shot.png");
        let b = merge([vec![chat], vec![att]], &ex);

        let images: Vec<_> = b.media.iter().filter(|m| m.kind == MediaKind::Image).collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source, SourceKind::TrackerAttachment);
        assert_eq!(images[0].source_event.as_str(), "tracker-attachment:a1");
    }

    #[test]
    fn total_chars_counts_separator_per_event() {
        let rules = ClassificationRules::default();
        let ex = MediaExtractor::new(&rules, 120);
        let events = vec![
            ev(SourceKind::TrackerComment, "c1", 1, 0, "abc"),
            ev(SourceKind::TrackerComment, "c2", 2, 1, "defg"),
        ];
        let expected: usize = events.iter().map(|e| e.rendered_chars() + 2).sum();
        let b = merge([events], &ex);
        assert_eq!(b.total_chars, expected);
    }
}
