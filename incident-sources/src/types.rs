//! Shared value types: date windows, ticket listings and chat thread refs.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use lazy_static::lazy_static;
use rca_engine::normalize::parse_timestamp;
use rca_engine::sources::TrackerTicket;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref SLACK_THREAD: Regex = Regex::new(
        r"https://[^/\s]*slack\.com/archives/([A-Z0-9]+)/p([0-9]{11,})(?:\?[^\s>|]*?thread_ts=([0-9]+\.[0-9]+))?"
    )
    .unwrap();
}

/// Statuses that count as finished on top of the `closed`/`done` status types.
const COMPLETED_STATUSES: &[&str] = &[
    "DUPLICATE",
    "EXTERNAL LIMITATION",
    "CUSTOMER SIDE FIX",
    "INVALID",
    "NOT REPRODUCIBLE",
    "AS DESIGNED",
    "CAN'T FIX",
    "COMPLETE",
    "COMPLETED",
    "CLOSED",
    "DONE",
    "RESOLVED",
];

/// Half-open creation-date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    /// Whole days from `since` through `until`, both inclusive.
    pub fn from_dates(since: NaiveDate, until: NaiveDate) -> Self {
        let start = since.and_time(NaiveTime::MIN).and_utc();
        let end = until.and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// `2024-05-01 to 2024-05-07`
    pub fn label(&self) -> String {
        let last = if self.end > self.start {
            self.end - Duration::seconds(1)
        } else {
            self.end
        };
        format!("{} to {}", self.start.format("%Y-%m-%d"), last.format("%Y-%m-%d"))
    }
}

/// One ticket as listed from a tracker folder, before its discussion is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketSummary {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub status: String,
    pub status_type: String,
    pub is_completed: bool,
    /// Name of the tracker list; customers have one list each.
    pub customer: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TicketSummary {
    /// Listing entry for a ticket fetched by id rather than found in a folder
    /// scan. The status type is unknown there, so completion goes by name or
    /// by a close date.
    pub fn from_ticket(ticket: &TrackerTicket, fallback_created: DateTime<Utc>) -> Self {
        let closed_at = ticket.closed_at.as_deref().and_then(parse_timestamp);
        let status = if ticket.status.trim().is_empty() {
            "Unknown".to_string()
        } else {
            ticket.status.clone()
        };
        Self {
            id: ticket.id.clone(),
            title: if ticket.title.trim().is_empty() {
                "No title".to_string()
            } else {
                ticket.title.clone()
            },
            url: ticket.url.clone(),
            is_completed: is_completed_status(&status, "") || closed_at.is_some(),
            status,
            status_type: String::new(),
            customer: ticket.customer.clone().unwrap_or_else(|| "Unknown".to_string()),
            owner: ticket
                .assignees
                .first()
                .cloned()
                .unwrap_or_else(|| "Unassigned".to_string()),
            created_at: ticket
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(fallback_created),
            closed_at,
        }
    }

    /// `"5 hours"` under a day, `"3 days"` otherwise.
    pub fn resolution_time(&self) -> Option<String> {
        let closed = self.closed_at.filter(|_| self.is_completed)?;
        let hours = (closed - self.created_at).num_hours().max(0);
        Some(if hours < 24 {
            format!("{hours} hours")
        } else {
            format!("{} days", hours / 24)
        })
    }
}

/// Done or closed by status name or status type.
pub fn is_completed_status(status: &str, status_type: &str) -> bool {
    let upper = status.trim().to_uppercase();
    COMPLETED_STATUSES.contains(&upper.as_str())
        || matches!(status_type.to_ascii_lowercase().as_str(), "closed" | "done")
}

/// A chat thread address: channel plus the root message `ts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ThreadRef {
    pub channel: String,
    pub ts: String,
    pub url: String,
}

impl ThreadRef {
    /// First Slack thread link in `text`.
    ///
    /// `p1700000000123456` becomes `1700000000.123456`; a `thread_ts` query
    /// parameter (link to a reply) wins over the message id.
    pub fn find_in(text: &str) -> Option<Self> {
        let caps = SLACK_THREAD.captures(text)?;
        let channel = caps.get(1)?.as_str().to_string();
        let ts = match caps.get(3) {
            Some(thread_ts) => thread_ts.as_str().to_string(),
            None => {
                let digits = caps.get(2)?.as_str();
                format!("{}.{}", &digits[..10], &digits[10..])
            }
        };
        Some(Self {
            channel,
            ts,
            url: caps.get(0)?.as_str().to_string(),
        })
    }
}
