//! Source normalization: tracker and chat records → [`ConversationEvent`].
//!
//! Normalization is pure. Records without an author or a usable timestamp
//! are rejected with [`SourceDataError`]; [`normalize_ticket`] logs and skips
//! them so one bad record never costs the ticket.

use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::BotRules;
use crate::errors::SourceDataError;
use crate::model::{Attachment, ConversationEvent, EventId, SourceKind};
use crate::sources::{ChatFile, ChatMessage, ChatThread, TrackerAttachment, TrackerComment, TrackerTicket};

/// Epoch values above this are milliseconds (10^10 seconds is the year 2286).
const MILLIS_THRESHOLD: i64 = 10_000_000_000;

lazy_static! {
    static ref SLACK_USER: Regex = Regex::new(r"<@[A-Z0-9]+(?:\|([^>]+))?>").unwrap();
    static ref SLACK_CHANNEL: Regex = Regex::new(r"<#[A-Z0-9]+\|([^>]+)>").unwrap();
    static ref SLACK_SPECIAL: Regex = Regex::new(r"<!(here|channel|everyone)(?:\|[^>]*)?>").unwrap();
    static ref SLACK_LINK: Regex = Regex::new(r"<((?:https?|mailto):[^>|]+)(?:\|[^>]*)?>").unwrap();
}

/// One record from any source, borrowed from the collaborator output.
#[derive(Debug, Clone, Copy)]
pub enum SourceRecord<'a> {
    TrackerComment(&'a TrackerComment),
    /// `parent` supplies author/time when the attachment lacks them.
    TrackerAttachment {
        attachment: &'a TrackerAttachment,
        parent: Option<&'a TrackerComment>,
    },
    ChatMessage(&'a ChatMessage),
    /// Files take author and time from the message that carried them.
    ChatFile {
        file: &'a ChatFile,
        message: &'a ChatMessage,
    },
}

impl SourceRecord<'_> {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRecord::TrackerComment(_) => SourceKind::TrackerComment,
            SourceRecord::TrackerAttachment { .. } => SourceKind::TrackerAttachment,
            SourceRecord::ChatMessage(_) => SourceKind::ChatMessage,
            SourceRecord::ChatFile { .. } => SourceKind::ChatFile,
        }
    }
}

/// Converts one record into a canonical event.
///
/// `seq` is the record's fetch order within its source.
pub fn normalize(
    record: SourceRecord<'_>,
    seq: usize,
    bots: &BotRules,
) -> Result<ConversationEvent, SourceDataError> {
    let source = record.kind();

    let (raw_ref, author, ts, text, source_bot, attachment) = match record {
        SourceRecord::TrackerComment(c) => (
            c.id.clone(),
            c.author.as_deref(),
            c.timestamp.as_deref(),
            clean_text(c.text.as_deref().unwrap_or_default()),
            false,
            None,
        ),
        SourceRecord::TrackerAttachment { attachment, parent } => (
            non_empty_or(&attachment.id, &attachment.url),
            attachment
                .uploaded_by
                .as_deref()
                .or_else(|| parent.and_then(|p| p.author.as_deref())),
            attachment
                .timestamp
                .as_deref()
                .or_else(|| parent.and_then(|p| p.timestamp.as_deref())),
            String::new(),
            false,
            Some(Attachment {
                url: attachment.url.clone(),
                name: attachment.title.clone(),
                mimetype: attachment.mimetype.clone(),
                thumb_url: attachment.thumbnail_url.clone(),
            }),
        ),
        SourceRecord::ChatMessage(m) => (
            m.ts.clone().unwrap_or_default(),
            m.user.as_deref(),
            m.ts.as_deref(),
            clean_chat_markup(&clean_text(m.text.as_deref().unwrap_or_default())),
            m.is_bot,
            None,
        ),
        SourceRecord::ChatFile { file, message } => (
            non_empty_or(&file.id, &file.url),
            message.user.as_deref(),
            message.ts.as_deref(),
            String::new(),
            message.is_bot,
            Some(Attachment {
                url: file.url.clone(),
                name: file.title.clone().or_else(|| file.name.clone()),
                mimetype: file.mimetype.clone(),
                thumb_url: file.thumb_url.clone(),
            }),
        ),
    };

    let author = match author.map(str::trim) {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => return Err(SourceDataError::MissingAuthor { raw_ref }),
    };

    let ts_raw = match ts.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Err(SourceDataError::MissingTimestamp { raw_ref }),
    };
    let timestamp = parse_timestamp(ts_raw).ok_or_else(|| SourceDataError::InvalidTimestamp {
        raw_ref: raw_ref.clone(),
        value: ts_raw.to_string(),
    })?;

    let is_bot = source_bot || bots.is_bot(&author, &text);

    Ok(ConversationEvent {
        id: EventId::new(source, &raw_ref),
        source,
        author,
        timestamp,
        text,
        is_bot,
        raw_ref,
        seq,
        attachment,
    })
}

/// Events of one ticket, split per source, plus the records that were dropped.
#[derive(Debug, Default)]
pub struct NormalizedTicket {
    pub tracker: Vec<ConversationEvent>,
    pub chat: Vec<ConversationEvent>,
    pub skipped: Vec<SourceDataError>,
}

/// Normalizes a ticket and its optional chat thread.
///
/// The description becomes the first tracker comment, authored by the
/// ticket creator at creation time.
pub fn normalize_ticket(
    ticket: &TrackerTicket,
    chat: Option<&ChatThread>,
    bots: &BotRules,
) -> NormalizedTicket {
    let mut out = NormalizedTicket::default();

    let description = ticket
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| TrackerComment {
            id: "description".to_string(),
            author: ticket.creator.clone(),
            timestamp: ticket.created_at.clone(),
            text: Some(d.to_string()),
            attachments: Vec::new(),
        });

    let mut tracker_records: Vec<SourceRecord<'_>> = Vec::new();
    if let Some(d) = &description {
        tracker_records.push(SourceRecord::TrackerComment(d));
    }
    for comment in &ticket.comments {
        tracker_records.push(SourceRecord::TrackerComment(comment));
        for att in &comment.attachments {
            tracker_records.push(SourceRecord::TrackerAttachment {
                attachment: att,
                parent: Some(comment),
            });
        }
    }

    let ticket_parent = TrackerComment {
        id: ticket.id.clone(),
        author: ticket.creator.clone(),
        timestamp: ticket.created_at.clone(),
        text: None,
        attachments: Vec::new(),
    };
    for att in &ticket.attachments {
        tracker_records.push(SourceRecord::TrackerAttachment {
            attachment: att,
            parent: Some(&ticket_parent),
        });
    }

    let mut chat_records: Vec<SourceRecord<'_>> = Vec::new();
    if let Some(thread) = chat {
        for msg in &thread.messages {
            chat_records.push(SourceRecord::ChatMessage(msg));
            for file in &msg.files {
                chat_records.push(SourceRecord::ChatFile { file, message: msg });
            }
        }
    }

    for (seq, rec) in tracker_records.into_iter().enumerate() {
        push_or_skip(&ticket.id, normalize(rec, seq, bots), &mut out.tracker, &mut out.skipped);
    }
    for (seq, rec) in chat_records.into_iter().enumerate() {
        push_or_skip(&ticket.id, normalize(rec, seq, bots), &mut out.chat, &mut out.skipped);
    }

    debug!(
        ticket = %ticket.id,
        tracker = out.tracker.len(),
        chat = out.chat.len(),
        skipped = out.skipped.len(),
        "normalized ticket records"
    );
    out
}

fn push_or_skip(
    ticket: &str,
    res: Result<ConversationEvent, SourceDataError>,
    events: &mut Vec<ConversationEvent>,
    skipped: &mut Vec<SourceDataError>,
) {
    match res {
        Ok(e) => events.push(e),
        Err(e) => {
            warn!(ticket = %ticket, error = %e, "skipping malformed source record");
            skipped.push(e);
        }
    }
}

/// Parses epoch millis, epoch seconds (optionally fractional, as in Slack
/// `ts`) or RFC 3339 into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw, None),
    };
    let value: i64 = int_part.parse().ok()?;

    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        let nanos: u32 = digits.parse().ok()?;
        return Utc.timestamp_opt(value, nanos).single();
    }

    if value.abs() > MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

/// Drops control characters except newline and tab; normalizes CRLF.
pub fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Rewrites Slack mrkdwn references into plain text.
pub fn clean_chat_markup(text: &str) -> String {
    let s = SLACK_USER.replace_all(text, |c: &regex::Captures<'_>| match c.get(1) {
        Some(name) => format!("@{}", name.as_str()),
        None => "@user".to_string(),
    });
    let s = SLACK_CHANNEL.replace_all(&s, "#$1");
    let s = SLACK_SPECIAL.replace_all(&s, "@$1");
    let s = SLACK_LINK.replace_all(&s, "$1");
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

fn non_empty_or(primary: &str, fallback: &str) -> String {
    if primary.trim().is_empty() {
        fallback.to_string()
    } else {
        primary.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn comment(id: &str, author: Option<&str>, ts: Option<&str>, text: &str) -> TrackerComment {
        TrackerComment {
            id: id.into(),
            author: author.map(Into::into),
            timestamp: ts.map(Into::into),
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn timestamps_from_every_source_format() {
        let ms = parse_timestamp("1700000000123").unwrap();
        let secs = parse_timestamp("1700000000").unwrap();
        let slack = parse_timestamp("1700000000.123456").unwrap();
        let rfc = parse_timestamp("2023-11-14T22:13:20+00:00").unwrap();
        assert_eq!(secs, rfc);
        assert_eq!(ms.timestamp(), 1_700_000_000);
        assert_eq!(ms.nanosecond(), 123_000_000);
        assert_eq!(slack.nanosecond(), 123_456_000);
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("17.x").is_none());
    }

    #[test]
    fn missing_author_or_timestamp_is_rejected() {
        let bots = BotRules::default();
        let no_author = comment("c1", None, Some("1700000000000"), "hi");
        let no_ts = comment("c2", Some("ann"), None, "hi");
        let bad_ts = comment("c3", Some("ann"), Some("soon"), "hi");
        assert!(matches!(
            normalize(SourceRecord::TrackerComment(&no_author), 0, &bots),
            Err(SourceDataError::MissingAuthor { .. })
        ));
        assert!(matches!(
            normalize(SourceRecord::TrackerComment(&no_ts), 0, &bots),
            Err(SourceDataError::MissingTimestamp { .. })
        ));
        assert!(matches!(
            normalize(SourceRecord::TrackerComment(&bad_ts), 0, &bots),
            Err(SourceDataError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn bots_are_tagged_not_dropped() {
        let bots = BotRules::default();
        let c = comment("c1", Some("ClickBot"), Some("1700000000000"), "status changed");
        let e = normalize(SourceRecord::TrackerComment(&c), 3, &bots).unwrap();
        assert!(e.is_bot);
        assert_eq!(e.seq, 3);
        assert_eq!(e.id.as_str(), "tracker-comment:c1");

        let msg = ChatMessage {
            ts: Some("1700000000.000100".into()),
            user: Some("deploy-app".into()),
            text: Some("deployed".into()),
            is_bot: true,
            files: Vec::new(),
        };
        assert!(normalize(SourceRecord::ChatMessage(&msg), 0, &bots).unwrap().is_bot);
    }

    #[test]
    fn chat_markup_is_cleaned() {
        let s = clean_chat_markup(
            "<@U123> see <#C42|ops> and <https://grafana.io/d/x|dash> &amp; <!here>",
        );
        assert_eq!(s, "@user see #ops and https://grafana.io/d/x & @here");
    }

    #[test]
    fn control_chars_are_stripped() {
        assert_eq!(clean_text("a\u{0007}b\r\nc\td"), "ab\nc\td");
    }

    #[test]
    fn attachment_inherits_parent_author_and_time() {
        let bots = BotRules::default();
        let parent = comment("c1", Some("ann"), Some("1700000000000"), "see screenshot");
        let att = TrackerAttachment {
            id: "a1".into(),
            title: Some("shot.png".into()),
            url: "https://t.example/shot.png".into(),
            ..Default::default()
        };
        let e = normalize(
            SourceRecord::TrackerAttachment {
                attachment: &att,
                parent: Some(&parent),
            },
            1,
            &bots,
        )
        .unwrap();
        assert_eq!(e.author, "ann");
        assert_eq!(e.source, SourceKind::TrackerAttachment);
        assert_eq!(e.attachment.as_ref().map(|a| a.url.as_str()), Some("https://t.example/shot.png"));
    }

    #[test]
    fn ticket_normalization_skips_bad_records() {
        let ticket = TrackerTicket {
            id: "T1".into(),
            title: "Login broken".into(),
            description: Some("Users cannot log in".into()),
            creator: Some("reporter".into()),
            created_at: Some("1700000000000".into()),
            comments: vec![
                comment("c1", Some("ann"), Some("1700000001000"), "looking"),
                comment("c2", None, Some("1700000002000"), "orphan"),
            ],
            ..Default::default()
        };
        let thread = ChatThread {
            channel: "C1".into(),
            thread_ts: "1700000000.000100".into(),
            permalink: None,
            messages: vec![ChatMessage {
                ts: Some("1700000003.000100".into()),
                user: Some("bob".into()),
                text: Some("fixed".into()),
                is_bot: false,
                files: vec![ChatFile {
                    id: "F1".into(),
                    name: Some("log.txt".into()),
                    url: "https://files.slack.com/F1".into(),
                    ..Default::default()
                }],
            }],
        };
        let n = normalize_ticket(&ticket, Some(&thread), &BotRules::default());
        assert_eq!(n.tracker.len(), 2);
        assert_eq!(n.tracker[0].raw_ref, "description");
        assert_eq!(n.tracker[0].author, "reporter");
        assert_eq!(n.chat.len(), 2);
        assert_eq!(n.chat[1].source, SourceKind::ChatFile);
        assert_eq!(n.chat[1].author, "bob");
        assert_eq!(n.skipped.len(), 1);
    }
}
