//! ClickUp tracker client (REST v2).
//!
//! Endpoints used:
//! - GET /user                         (connection test)
//! - GET /folder/:id                   (customer lists)
//! - GET /list/:id/task                (paged, closed tasks included)
//! - GET /task/:id                     (markdown description, attachments, custom fields)
//! - GET /task/:id/comment             (block-formatted comments)
//!
//! Raw payloads are deserialized into private `Raw*` structs and converted
//! into the engine's [`TrackerTicket`] by pure functions.

use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use rca_engine::normalize::parse_timestamp;
use rca_engine::sources::{TrackerAttachment, TrackerComment, TrackerTicket};

use crate::config::ClickUpConfig;
use crate::errors::SourceResult;
use crate::types::{DateRange, ThreadRef, TicketSummary, is_completed_status};

const PAGE_SIZE: usize = 100;

/// Lists whose names contain any of these are internal, not customer lists.
const SKIP_LIST_MARKERS: &[&str] = &["infra", "internal", "test"];

#[derive(Debug, Clone)]
pub struct ClickUpClient {
    http: Client,
    base_api: String,
    token: String,
}

impl ClickUpClient {
    pub fn new(cfg: &ClickUpConfig) -> SourceResult<Self> {
        let http = Client::builder()
            .user_agent("rca-backend/0.1")
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self::with_client(http, cfg.base_api.clone(), cfg.token.clone()))
    }

    pub fn with_client(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api,
            token,
        }
    }

    /// Connection test; returns the token owner's username.
    pub async fn current_user(&self) -> SourceResult<String> {
        let url = format!("{}/user", self.base_api);
        let resp: UserResp = self
            .http
            .get(url)
            .header("Authorization", &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.user.username.unwrap_or_else(|| "unknown".to_string()))
    }

    /// Tickets created inside `range` across the customer lists of a folder.
    ///
    /// A list that fails to load is logged and skipped; a folder that fails
    /// to load is an error.
    pub async fn list_folder_tickets(
        &self,
        folder_id: &str,
        range: &DateRange,
    ) -> SourceResult<Vec<TicketSummary>> {
        let t0 = Instant::now();
        let url = format!("{}/folder/{}", self.base_api, urlencoding::encode(folder_id));
        let folder: FolderResp = self
            .http
            .get(url)
            .header("Authorization", &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("clickup: folder {} has {} lists", folder_id, folder.lists.len());

        let mut out = Vec::new();
        for list in folder.lists.iter().filter(|l| is_customer_list(&l.name)) {
            match self.list_tasks(&list.id, range).await {
                Ok(tasks) => {
                    let before = out.len();
                    out.extend(
                        tasks
                            .iter()
                            .filter_map(|t| summary_from_task(t, &list.name, range)),
                    );
                    let added = &out[before..];
                    let done = added.iter().filter(|t| t.is_completed).count();
                    debug!(
                        "clickup: list '{}' → {} tickets ({} done, {} open)",
                        list.name,
                        added.len(),
                        done,
                        added.len() - done
                    );
                }
                Err(e) => warn!(list = %list.name, error = %e, "clickup: failed to list tasks; skipping list"),
            }
        }

        info!(
            folder = %folder_id,
            tickets = out.len(),
            latency_ms = t0.elapsed().as_millis(),
            "clickup: folder scanned"
        );
        Ok(out)
    }

    async fn list_tasks(&self, list_id: &str, range: &DateRange) -> SourceResult<Vec<RawTask>> {
        let url = format!("{}/list/{}/task", self.base_api, urlencoding::encode(list_id));
        let mut all = Vec::new();
        let mut page = 0u32;
        loop {
            let resp: TaskPage = self
                .http
                .get(&url)
                .header("Authorization", &self.token)
                .query(&[
                    ("archived", "false".to_string()),
                    ("page", page.to_string()),
                    ("order_by", "created".to_string()),
                    ("reverse", "true".to_string()),
                    ("subtasks", "false".to_string()),
                    ("include_closed", "true".to_string()),
                    ("date_created_gt", range.start_millis().to_string()),
                    ("date_created_lt", range.end_millis().to_string()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let n = resp.tasks.len();
            all.extend(resp.tasks);
            if n < PAGE_SIZE || resp.last_page == Some(true) {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    /// Full ticket: task, markdown description, attachments and comments.
    ///
    /// Comments that fail to load are logged and left out.
    pub async fn fetch_ticket(&self, task_id: &str) -> SourceResult<TrackerTicket> {
        let t0 = Instant::now();
        let id = urlencoding::encode(task_id);
        let task: RawTask = self
            .http
            .get(format!("{}/task/{}", self.base_api, id))
            .header("Authorization", &self.token)
            .query(&[
                ("include_markdown_description", "true"),
                ("include_subtasks", "true"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let comments = match self.task_comments(task_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(task = %task_id, error = %e, "clickup: comments unavailable");
                Vec::new()
            }
        };

        let ticket = ticket_from_raw(task, comments);
        debug!(
            "clickup: task {} fetched, comments={} attachments={} chat_link={} ({} ms)",
            task_id,
            ticket.comments.len(),
            ticket.attachments.len(),
            ticket.chat_thread_url.is_some(),
            t0.elapsed().as_millis()
        );
        Ok(ticket)
    }

    async fn task_comments(&self, task_id: &str) -> SourceResult<Vec<RawComment>> {
        let url = format!(
            "{}/task/{}/comment",
            self.base_api,
            urlencoding::encode(task_id)
        );
        let resp: CommentsResp = self
            .http
            .get(url)
            .header("Authorization", &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.comments)
    }
}

pub(crate) fn is_customer_list(name: &str) -> bool {
    let lower = name.to_lowercase();
    !SKIP_LIST_MARKERS.iter().any(|m| lower.contains(m))
}

/* ------------------------------------------------------------------------- */
/* Conversions                                                               */
/* ------------------------------------------------------------------------- */

fn summary_from_task(task: &RawTask, list_name: &str, range: &DateRange) -> Option<TicketSummary> {
    let created_at = task.date_created.as_deref().and_then(parse_timestamp)?;
    if !range.contains(created_at) {
        return None;
    }
    let (status, status_type) = task
        .status
        .as_ref()
        .map(|s| (s.status.clone(), s.kind.clone()))
        .unwrap_or_else(|| ("Unknown".to_string(), String::new()));
    let is_completed = is_completed_status(&status, &status_type);
    let closed_at = task
        .date_closed
        .as_deref()
        .or(task.date_done.as_deref())
        .and_then(parse_timestamp);

    Some(TicketSummary {
        id: task.id.clone(),
        title: non_empty(&task.name).unwrap_or_else(|| "No title".to_string()),
        url: task.url.clone(),
        status,
        status_type,
        is_completed,
        customer: list_name.to_string(),
        owner: task
            .assignees
            .iter()
            .find_map(|a| a.username.clone())
            .unwrap_or_else(|| "Unassigned".to_string()),
        created_at,
        closed_at,
    })
}

fn ticket_from_raw(task: RawTask, mut comments: Vec<RawComment>) -> TrackerTicket {
    // The API lists newest first.
    comments.sort_by_key(|c| c.date.as_deref().and_then(parse_timestamp));

    let converted: Vec<TrackerComment> = comments.iter().map(comment_from_raw).collect();
    let chat_thread_url = find_chat_thread(&task, &converted);

    let description = task
        .markdown_description
        .as_deref()
        .and_then(non_empty)
        .or_else(|| task.description.as_deref().and_then(non_empty));

    TrackerTicket {
        id: task.id,
        title: task.name,
        status: task.status.map(|s| s.status).unwrap_or_default(),
        url: task.url,
        description,
        creator: task.creator.and_then(|u| u.username),
        created_at: task.date_created,
        closed_at: task.date_closed.or(task.date_done),
        assignees: task.assignees.into_iter().filter_map(|u| u.username).collect(),
        customer: task.list.map(|l| l.name).filter(|n| !n.is_empty()),
        comments: converted,
        attachments: task
            .attachments
            .into_iter()
            .filter_map(attachment_from_raw)
            .collect(),
        chat_thread_url,
    }
}

fn attachment_from_raw(a: RawAttachment) -> Option<TrackerAttachment> {
    let url = a.url.filter(|u| !u.trim().is_empty())?;
    Some(TrackerAttachment {
        id: a.id,
        title: a.title,
        url,
        mimetype: a.mimetype,
        thumbnail_url: a.thumbnail_small.or(a.thumbnail_large),
        uploaded_by: a.user.and_then(|u| u.username),
        timestamp: a.date,
    })
}

fn comment_from_raw(c: &RawComment) -> TrackerComment {
    let (text, attachments) = if c.comment.is_empty() {
        (c.comment_text.clone().unwrap_or_default(), Vec::new())
    } else {
        flatten_blocks(&c.id, &c.comment)
    };
    TrackerComment {
        id: c.id.clone(),
        author: c.user.as_ref().and_then(|u| u.username.clone()),
        timestamp: c.date.clone(),
        text: Some(text.trim().to_string()),
        attachments,
    }
}

/// Rebuilds comment text from ClickUp's block (Quill delta) format.
///
/// A newline carrying a `code-block` attribute ends a code line; consecutive
/// code lines are re-fenced. Inline `code` spans get backticks. Image and
/// attachment blocks become attachments of the comment.
pub(crate) fn flatten_blocks(comment_id: &str, blocks: &[Value]) -> (String, Vec<TrackerAttachment>) {
    let mut out = String::new();
    let mut line = String::new();
    let mut code: Vec<String> = Vec::new();
    let mut code_lang: Option<String> = None;
    let mut attachments = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        if let Some(att) = block_attachment(comment_id, i, block) {
            attachments.push(att);
            continue;
        }
        let Some(text) = block.get("text").and_then(Value::as_str) else {
            continue;
        };
        let attrs = block.get("attributes");
        let code_block = attrs.and_then(|a| a.get("code-block"));
        let inline_code = attrs
            .and_then(|a| a.get("code"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut pieces = text.split('\n').peekable();
        while let Some(piece) = pieces.next() {
            if inline_code && !piece.is_empty() {
                line.push('`');
                line.push_str(piece);
                line.push('`');
            } else {
                line.push_str(piece);
            }
            if pieces.peek().is_none() {
                break;
            }
            // a newline ends the current line
            if let Some(cb) = code_block {
                if code.is_empty() {
                    code_lang = code_language(cb);
                }
                code.push(std::mem::take(&mut line));
            } else {
                flush_code(&mut out, &mut code, &mut code_lang);
                out.push_str(&line);
                out.push('\n');
                line.clear();
            }
        }
    }
    flush_code(&mut out, &mut code, &mut code_lang);
    out.push_str(&line);
    (out, attachments)
}

fn flush_code(out: &mut String, code: &mut Vec<String>, lang: &mut Option<String>) {
    if code.is_empty() {
        return;
    }
    out.push_str("```");
    if let Some(l) = lang.take() {
        out.push_str(&l);
    }
    out.push('\n');
    out.push_str(&code.join("\n"));
    out.push_str("\n```\n");
    code.clear();
}

fn code_language(attr: &Value) -> Option<String> {
    attr.get("code-block")
        .and_then(Value::as_str)
        .or_else(|| attr.as_str())
        .filter(|l| !l.is_empty() && *l != "plain")
        .map(str::to_string)
}

fn block_attachment(comment_id: &str, index: usize, block: &Value) -> Option<TrackerAttachment> {
    let kind = block.get("type").and_then(Value::as_str)?;
    if kind != "image" && kind != "attachment" {
        return None;
    }
    let inner = block.get(kind)?;
    let url = inner.get("url").and_then(Value::as_str)?.to_string();
    let field = |k: &str| inner.get(k).and_then(Value::as_str).map(str::to_string);
    Some(TrackerAttachment {
        id: field("id").unwrap_or_else(|| format!("{comment_id}#{index}")),
        title: field("title").or_else(|| field("name")),
        url,
        mimetype: field("mimetype"),
        thumbnail_url: field("thumbnail_large").or_else(|| field("thumbnail_small")),
        uploaded_by: None,
        timestamp: None,
    })
}

/// Looks for a chat thread link in the description, comments, chat-related
/// custom fields and chat-titled attachments, in that order.
fn find_chat_thread(task: &RawTask, comments: &[TrackerComment]) -> Option<String> {
    let field_values: Vec<String> = task
        .custom_fields
        .iter()
        .filter(|f| {
            let name = f.name.to_lowercase();
            name.contains("slack") || name.contains("thread")
        })
        .filter_map(|f| f.value.as_ref().map(value_text))
        .collect();
    let texts = [task.description.as_deref(), task.markdown_description.as_deref()]
        .into_iter()
        .flatten();
    let comment_texts = comments.iter().filter_map(|c| c.text.as_deref());
    let attachment_urls = task
        .attachments
        .iter()
        .filter(|a| {
            a.title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains("slack"))
        })
        .filter_map(|a| a.url.as_deref());

    texts
        .chain(comment_texts)
        .chain(field_values.iter().map(String::as_str))
        .chain(attachment_urls)
        .find_map(ThreadRef::find_in)
        .map(|r| r.url)
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/* ------------------------------------------------------------------------- */
/* Raw payloads                                                              */
/* ------------------------------------------------------------------------- */

/// ClickUp sends ids and epoch-millis dates as strings or numbers.
fn string_or_number<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn id_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(d).map(Option::unwrap_or_default)
}

#[derive(Debug, Deserialize)]
struct UserResp {
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct FolderResp {
    #[serde(default)]
    lists: Vec<RawList>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawList {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    tasks: Vec<RawTask>,
    #[serde(default)]
    last_page: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTask {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<RawStatus>,
    #[serde(default, deserialize_with = "string_or_number")]
    date_created: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    date_closed: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    date_done: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    markdown_description: Option<String>,
    #[serde(default)]
    creator: Option<RawUser>,
    #[serde(default)]
    assignees: Vec<RawUser>,
    #[serde(default)]
    list: Option<RawList>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    custom_fields: Vec<RawCustomField>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawStatus {
    #[serde(default)]
    status: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAttachment {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    thumbnail_small: Option<String>,
    #[serde(default)]
    thumbnail_large: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    date: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCustomField {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CommentsResp {
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawComment {
    #[serde(default, deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    comment: Vec<Value>,
    #[serde(default)]
    comment_text: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default, deserialize_with = "string_or_number")]
    date: Option<String>,
}
