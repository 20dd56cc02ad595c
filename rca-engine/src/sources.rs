//! Raw records handed to the engine by the tracker and chat collaborators.
//!
//! These mirror what the services return with only light cleanup: fields
//! the engine needs may still be missing, and timestamps keep their
//! source-native encoding (epoch millis, Slack `ts`, RFC 3339).

use serde::{Deserialize, Serialize};

/// One tracker ticket with its discussion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerTicket {
    pub id: String,
    pub title: String,
    pub status: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
    pub assignees: Vec<String>,
    /// Tracker list the ticket lives in; used to group the report by customer.
    pub customer: Option<String>,
    pub comments: Vec<TrackerComment>,
    /// Ticket-level attachments (not tied to a comment).
    pub attachments: Vec<TrackerAttachment>,
    /// Chat thread URL referenced from the ticket, if any.
    pub chat_thread_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerComment {
    pub id: String,
    pub author: Option<String>,
    pub timestamp: Option<String>,
    pub text: Option<String>,
    pub attachments: Vec<TrackerAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerAttachment {
    pub id: String,
    pub title: Option<String>,
    pub url: String,
    pub mimetype: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Falls back to the owning comment's author when absent.
    pub uploaded_by: Option<String>,
    /// Falls back to the owning comment's timestamp when absent.
    pub timestamp: Option<String>,
}

/// One chat thread (parent message plus replies).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub channel: String,
    pub thread_ts: String,
    pub permalink: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub ts: Option<String>,
    /// Display name when resolved, otherwise the raw user id.
    pub user: Option<String>,
    pub text: Option<String>,
    /// Source-provided automation flag (e.g. Slack `bot_id` present).
    pub is_bot: bool,
    pub files: Vec<ChatFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatFile {
    pub id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub mimetype: Option<String>,
    pub url: String,
    pub thumb_url: Option<String>,
}
