//! Slack Web API client for support threads.
//!
//! Endpoints used:
//! - auth.test               (connection test)
//! - conversations.replies   (thread root plus replies, cursor-paged, 200 per page)
//! - users.info              (display names, cached for the client's lifetime)
//!
//! A thread that does not exist or is not visible to the bot is `Ok(None)`:
//! a ticket without chat data is still analyzed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use rca_engine::sources::{ChatFile, ChatMessage, ChatThread};

use crate::config::SlackConfig;
use crate::errors::{ProviderError, SourceError, SourceResult};
use crate::types::ThreadRef;

const REPLIES_LIMIT: u32 = 200;

/// Parses the first Slack thread link in `text`.
pub fn find_thread_link(text: &str) -> Option<ThreadRef> {
    ThreadRef::find_in(text)
}

/// Identity behind the bot token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackIdentity {
    pub user: String,
    pub team: String,
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    http: Client,
    base_api: String,
    token: String,
    users: Arc<RwLock<HashMap<String, String>>>,
}

impl SlackClient {
    pub fn new(cfg: &SlackConfig) -> SourceResult<Self> {
        let http = Client::builder()
            .user_agent("rca-backend/0.1")
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self {
            http,
            base_api: cfg.base_api.clone(),
            token: cfg.token.clone(),
            users: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn auth_test(&self) -> SourceResult<SlackIdentity> {
        let resp: AuthResp = self.call("auth.test", &[]).await?;
        check(resp.ok, resp.error.as_deref())?;
        Ok(SlackIdentity {
            user: resp.user.unwrap_or_else(|| "bot".to_string()),
            team: resp.team.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Root message and replies of a thread, oldest first.
    pub async fn fetch_thread(&self, thread: &ThreadRef) -> SourceResult<Option<ChatThread>> {
        let t0 = Instant::now();
        let mut raw: Vec<RawMessage> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("channel", thread.channel.clone()),
                ("ts", thread.ts.clone()),
                ("limit", REPLIES_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }
            let resp: RepliesResp = self.call("conversations.replies", &params).await?;
            match check(resp.ok, resp.error.as_deref()) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(channel = %thread.channel, ts = %thread.ts, "slack: thread not found");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
            raw.extend(resp.messages);

            cursor = resp
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            if !resp.has_more || cursor.is_none() {
                break;
            }
        }

        if raw.is_empty() {
            return Ok(None);
        }

        let mut names = HashMap::new();
        for id in raw.iter().filter_map(|m| m.user.as_deref()) {
            if !names.contains_key(id) {
                let name = self.user_name(id).await;
                names.insert(id.to_string(), name);
            }
        }

        let messages: Vec<ChatMessage> = raw.iter().map(|m| message_from_raw(m, &names)).collect();
        debug!(
            "slack: thread {}/{} fetched, messages={} users={} ({} ms)",
            thread.channel,
            thread.ts,
            messages.len(),
            names.len(),
            t0.elapsed().as_millis()
        );

        Ok(Some(ChatThread {
            channel: thread.channel.clone(),
            thread_ts: thread.ts.clone(),
            permalink: Some(thread.url.clone()),
            messages,
        }))
    }

    /// Real name, then handle; `User_XXXX` when the lookup fails.
    async fn user_name(&self, user_id: &str) -> String {
        if let Some(name) = self.users.read().await.get(user_id) {
            return name.clone();
        }

        let looked_up = self
            .call::<UsersInfoResp>("users.info", &[("user", user_id.to_string())])
            .await
            .and_then(|r| {
                check(r.ok, r.error.as_deref())?;
                Ok(r.user.and_then(|u| u.display_name()))
            });

        match looked_up {
            Ok(Some(name)) => {
                self.users
                    .write()
                    .await
                    .insert(user_id.to_string(), name.clone());
                name
            }
            Ok(None) => fallback_user_name(user_id),
            Err(e) => {
                warn!(user = %user_id, error = %e, "slack: user lookup failed");
                fallback_user_name(user_id)
            }
        }
    }

    async fn call<T>(&self, method: &str, params: &[(&str, String)]) -> SourceResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_api, method);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs }.into());
        }
        Ok(resp.error_for_status()?.json().await?)
    }
}

fn check(ok: bool, error: Option<&str>) -> SourceResult<()> {
    if ok {
        Ok(())
    } else {
        Err(SourceError::Provider(ProviderError::from_slack(
            error.unwrap_or("unknown_error"),
        )))
    }
}

fn fallback_user_name(user_id: &str) -> String {
    let tail: String = user_id
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("User_{tail}")
}

fn message_from_raw(m: &RawMessage, names: &HashMap<String, String>) -> ChatMessage {
    let is_bot = m.bot_id.is_some() || m.subtype.as_deref() == Some("bot_message");
    let user = match m.user.as_deref() {
        Some(id) => Some(names.get(id).cloned().unwrap_or_else(|| id.to_string())),
        None => m
            .username
            .clone()
            .or_else(|| m.bot_profile.as_ref().and_then(|b| b.name.clone())),
    };
    ChatMessage {
        ts: m.ts.clone(),
        user,
        text: m.text.clone(),
        is_bot,
        files: m.files.iter().filter_map(file_from_raw).collect(),
    }
}

fn file_from_raw(f: &RawFile) -> Option<ChatFile> {
    let url = f
        .url_private
        .clone()
        .or_else(|| f.permalink.clone())
        .filter(|u| !u.is_empty())?;
    Some(ChatFile {
        id: f.id.clone(),
        name: f.name.clone(),
        title: f.title.clone(),
        mimetype: f.mimetype.clone(),
        url,
        thumb_url: f.thumb_360.clone().or_else(|| f.thumb_480.clone()),
    })
}

/* ------------------------------------------------------------------------- */
/* Raw payloads                                                              */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
struct AuthResp {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    team: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepliesResp {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_profile: Option<BotProfile>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
struct BotProfile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    url_private: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    thumb_360: Option<String>,
    #[serde(default)]
    thumb_480: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersInfoResp {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

impl RawUser {
    fn display_name(self) -> Option<String> {
        self.real_name
            .filter(|n| !n.trim().is_empty())
            .or(self.name.filter(|n| !n.trim().is_empty()))
    }
}
