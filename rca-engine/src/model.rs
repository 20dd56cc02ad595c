//! Canonical data model shared by every stage of the engine.
//!
//! - [`ConversationEvent`]: one utterance in the unified timeline
//! - [`MediaItem`]: one extracted artifact (image, link, code, file)
//! - [`ConversationBundle`]: ordered events plus deduplicated media for one ticket
//! - [`RcaResult`]: the four RCA sections and how they were obtained

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Placeholder for any RCA section the analysis could not provide.
pub const FALLBACK: &str = "Not determined from available data";

/// Per-event formatting overhead (the blank line between rendered events).
pub const EVENT_SEPARATOR: &str = "\n\n";

/* ------------------------------------------------------------------------- */
/* Events                                                                    */
/* ------------------------------------------------------------------------- */

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TrackerComment,
    TrackerAttachment,
    ChatMessage,
    ChatFile,
}

impl SourceKind {
    /// Ordering priority on timestamp ties: tracker before chat.
    pub fn priority(self) -> u8 {
        match self {
            SourceKind::TrackerComment | SourceKind::TrackerAttachment => 0,
            SourceKind::ChatMessage | SourceKind::ChatFile => 1,
        }
    }

    pub fn is_chat(self) -> bool {
        self.priority() == 1
    }

    /// Stable short tag used in event ids.
    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::TrackerComment => "tracker-comment",
            SourceKind::TrackerAttachment => "tracker-attachment",
            SourceKind::ChatMessage => "chat-message",
            SourceKind::ChatFile => "chat-file",
        }
    }

    /// Label shown next to the author in rendered conversation text.
    fn label(self) -> &'static str {
        match self {
            SourceKind::TrackerComment => "tracker",
            SourceKind::TrackerAttachment => "tracker attachment",
            SourceKind::ChatMessage => "chat",
            SourceKind::ChatFile => "chat file",
        }
    }
}

/// Weak, lookup-only reference to a [`ConversationEvent`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(source: SourceKind, raw_ref: &str) -> Self {
        Self(format!("{}:{raw_ref}", source.tag()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File payload carried by attachment and chat-file events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub url: String,
    pub name: Option<String>,
    pub mimetype: Option<String>,
    pub thumb_url: Option<String>,
}

/// One normalized utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationEvent {
    pub id: EventId,
    pub source: SourceKind,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub is_bot: bool,
    pub raw_ref: String,
    /// Fetch order within the originating source.
    pub seq: usize,
    pub attachment: Option<Attachment>,
}

impl ConversationEvent {
    /// Serialized form used for budgeting and prompt assembly.
    ///
    /// `[2024-05-01 10:00:00 UTC] alice (chat): text`
    pub fn render(&self) -> String {
        let mut out = format!(
            "[{}] {} ({}): ",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.author,
            self.source.label()
        );
        out.push_str(&self.text);
        if let Some(att) = &self.attachment {
            if !self.text.is_empty() {
                out.push(' ');
            }
            out.push_str("[file: ");
            if let Some(name) = &att.name {
                out.push_str(name);
                out.push(' ');
            }
            out.push_str(&att.url);
            out.push(']');
        }
        out
    }

    /// Character count of [`render`](Self::render).
    pub fn rendered_chars(&self) -> usize {
        self.render().chars().count()
    }
}

/* ------------------------------------------------------------------------- */
/* Media                                                                     */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    ReferenceLink,
    CodeSnippet,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    Screenshot,
    ErrorImage,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCategory {
    Console,
    Dashboard,
    Other,
}

/// Category metadata; images and links only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Image(ImageCategory),
    Link(LinkCategory),
    None,
}

/// One extracted artifact with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    /// URL for images, links and files; body for code snippets.
    pub url_or_content: String,
    pub category: MediaCategory,
    /// Link label, image alt text or file title.
    pub label: Option<String>,
    /// Declared language of a fenced code block.
    pub language: Option<String>,
    pub thumb_url: Option<String>,
    pub source_event: EventId,
    pub source: SourceKind,
    pub dedup_key: String,
}

impl MediaItem {
    pub fn image_category(&self) -> Option<ImageCategory> {
        match self.category {
            MediaCategory::Image(c) => Some(c),
            _ => None,
        }
    }

    pub fn link_category(&self) -> Option<LinkCategory> {
        match self.category {
            MediaCategory::Link(c) => Some(c),
            _ => None,
        }
    }
}

/// Badge counts over a bundle's media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaSummary {
    pub images: usize,
    pub error_images: usize,
    pub screenshots: usize,
    pub console_links: usize,
    pub dashboard_links: usize,
    pub other_links: usize,
    pub code_snippets: usize,
    pub files: usize,
}

impl MediaSummary {
    pub fn links(&self) -> usize {
        self.console_links + self.dashboard_links + self.other_links
    }
}

/* ------------------------------------------------------------------------- */
/* Bundle                                                                    */
/* ------------------------------------------------------------------------- */

/// Merged conversation for one ticket. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationBundle {
    pub events: Vec<ConversationEvent>,
    pub media: Vec<MediaItem>,
    pub total_chars: usize,
}

impl ConversationBundle {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn media_summary(&self) -> MediaSummary {
        let mut s = MediaSummary::default();
        for item in &self.media {
            match (item.kind, item.category) {
                (MediaKind::Image, c) => {
                    s.images += 1;
                    match c {
                        MediaCategory::Image(ImageCategory::ErrorImage) => s.error_images += 1,
                        MediaCategory::Image(ImageCategory::Screenshot) => s.screenshots += 1,
                        _ => {}
                    }
                }
                (MediaKind::ReferenceLink, MediaCategory::Link(LinkCategory::Console)) => {
                    s.console_links += 1
                }
                (MediaKind::ReferenceLink, MediaCategory::Link(LinkCategory::Dashboard)) => {
                    s.dashboard_links += 1
                }
                (MediaKind::ReferenceLink, _) => s.other_links += 1,
                (MediaKind::CodeSnippet, _) => s.code_snippets += 1,
                (MediaKind::File, _) => s.files += 1,
            }
        }
        s
    }

    /// Distinct human authors in order of first appearance.
    pub fn engineers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in self.events.iter().filter(|e| !e.is_bot) {
            if !out.contains(&e.author.as_str()) {
                out.push(&e.author);
            }
        }
        out
    }

    pub fn has_chat(&self) -> bool {
        self.events.iter().any(|e| e.source.is_chat())
    }

    /// Event lookup for a media item's `source_event`.
    pub fn event(&self, id: &EventId) -> Option<&ConversationEvent> {
        self.events.iter().find(|e| &e.id == id)
    }
}

/* ------------------------------------------------------------------------- */
/* RCA result                                                                */
/* ------------------------------------------------------------------------- */

/// The four RCA sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RcaSection {
    Summary,
    DebugSteps,
    ResolutionSteps,
    RootCause,
}

impl RcaSection {
    pub const ALL: [RcaSection; 4] = [
        RcaSection::Summary,
        RcaSection::DebugSteps,
        RcaSection::ResolutionSteps,
        RcaSection::RootCause,
    ];

    /// Heading used in prompts and reports.
    pub fn title(self) -> &'static str {
        match self {
            RcaSection::Summary => "Summary of the Issue",
            RcaSection::DebugSteps => "Steps to Debug",
            RcaSection::ResolutionSteps => "Steps to Resolution",
            RcaSection::RootCause => "Root Cause Analysis",
        }
    }

    /// Key in the JSON response format.
    pub fn json_key(self) -> &'static str {
        match self {
            RcaSection::Summary => "summary",
            RcaSection::DebugSteps => "debug_steps",
            RcaSection::ResolutionSteps => "resolution_steps",
            RcaSection::RootCause => "root_cause",
        }
    }
}

impl fmt::Display for RcaSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// How an [`RcaResult`] was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RcaStatus {
    /// Sections come from the model.
    Complete,
    /// Too little human conversation to analyze; no model call was made.
    NoConversation,
    /// The completion call failed; all sections hold [`FALLBACK`].
    Unavailable { reason: String },
}

/// Final RCA for one ticket. No section is ever absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RcaResult {
    pub summary: String,
    pub debug_steps: String,
    pub resolution_steps: String,
    pub root_cause: String,
    pub status: RcaStatus,
    /// Some event was truncated before reaching the model.
    pub incomplete_context: bool,
    /// Sections that resolved to [`FALLBACK`] because the model omitted them.
    pub missing_sections: Vec<RcaSection>,
}

impl RcaResult {
    /// Degraded result after a provider failure.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            summary: FALLBACK.to_string(),
            debug_steps: FALLBACK.to_string(),
            resolution_steps: FALLBACK.to_string(),
            root_cause: FALLBACK.to_string(),
            status: RcaStatus::Unavailable {
                reason: reason.into(),
            },
            incomplete_context: false,
            missing_sections: Vec::new(),
        }
    }

    /// Result for tickets without meaningful human discussion.
    pub fn no_conversation(title: &str) -> Self {
        let summary = if title.trim().is_empty() {
            FALLBACK.to_string()
        } else {
            title.trim().to_string()
        };
        Self {
            summary,
            debug_steps: "No debugging steps documented in the conversation".to_string(),
            resolution_steps: "No resolution steps documented in the conversation".to_string(),
            root_cause: "Root cause not identified in the conversation".to_string(),
            status: RcaStatus::NoConversation,
            incomplete_context: false,
            missing_sections: Vec::new(),
        }
    }

    pub fn analysis_unavailable(&self) -> bool {
        matches!(self.status, RcaStatus::Unavailable { .. })
    }

    pub fn section(&self, section: RcaSection) -> &str {
        match section {
            RcaSection::Summary => &self.summary,
            RcaSection::DebugSteps => &self.debug_steps,
            RcaSection::ResolutionSteps => &self.resolution_steps,
            RcaSection::RootCause => &self.root_cause,
        }
    }

    pub(crate) fn section_mut(&mut self, section: RcaSection) -> &mut String {
        match section {
            RcaSection::Summary => &mut self.summary,
            RcaSection::DebugSteps => &mut self.debug_steps,
            RcaSection::ResolutionSteps => &mut self.resolution_steps,
            RcaSection::RootCause => &mut self.root_cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(text: &str, attachment: Option<Attachment>) -> ConversationEvent {
        ConversationEvent {
            id: EventId::new(SourceKind::ChatMessage, "1"),
            source: SourceKind::ChatMessage,
            author: "alice".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            text: text.into(),
            is_bot: false,
            raw_ref: "1".into(),
            seq: 0,
            attachment,
        }
    }

    #[test]
    fn render_includes_time_author_and_source() {
        let e = event("pod restarted", None);
        assert_eq!(e.render(), "[2024-05-01 10:00:00 UTC] alice (chat): pod restarted");
        assert_eq!(e.rendered_chars(), e.render().chars().count());
    }

    #[test]
    fn render_appends_attachment() {
        let e = event(
            "",
            Some(Attachment {
                url: "https://files/x.png".into(),
                name: Some("x.png".into()),
                mimetype: None,
                thumb_url: None,
            }),
        );
        assert!(e.render().ends_with("(chat): [file: x.png https://files/x.png]"));
    }

    #[test]
    fn unavailable_sets_every_section_to_fallback() {
        let r = RcaResult::unavailable("timeout");
        assert!(r.analysis_unavailable());
        for s in RcaSection::ALL {
            assert_eq!(r.section(s), FALLBACK);
        }
    }

    #[test]
    fn no_conversation_uses_title() {
        let r = RcaResult::no_conversation("  Login broken ");
        assert_eq!(r.summary, "Login broken");
        assert!(!r.analysis_unavailable());
        assert_eq!(RcaResult::no_conversation("").summary, FALLBACK);
    }
}
