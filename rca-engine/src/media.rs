//! Media extraction from conversation events.
//!
//! Per event, in this order:
//! - the event's own attachment (image or plain file)
//! - markdown images `![alt](url)`
//! - bare URLs: image URLs by extension, everything else a reference link
//!   classified by the ordered [`LinkRule`](crate::config::LinkRule) table
//! - fenced code blocks (language tag kept), then indented code blocks
//!
//! URLs inside markdown images or fenced code are not reported twice.
//! Nothing here fails: unknown links become `Other`, unclassified images
//! `Generic`.

use std::ops::Range;
use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::{ClassificationRules, EngineConfig};
use crate::model::{Attachment, ConversationEvent, ImageCategory, MediaCategory, MediaItem, MediaKind};

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?s)```([\w+#.\-]*)[ \t]*\n?(.*?)```").unwrap();
    static ref MD_IMAGE: Regex =
        Regex::new(r#"!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#).unwrap();
    static ref BARE_URL: Regex = Regex::new(r#"https?://[^\s<>"'`\[\]{}|\\^]+"#).unwrap();
}

/// Scans events for media using a fixed classification table.
#[derive(Debug, Clone, Copy)]
pub struct MediaExtractor<'r> {
    rules: &'r ClassificationRules,
    window: usize,
}

impl<'r> MediaExtractor<'r> {
    pub fn new(rules: &'r ClassificationRules, window: usize) -> Self {
        Self { rules, window }
    }

    pub fn from_config(cfg: &'r EngineConfig) -> Self {
        Self::new(&cfg.classify, cfg.image_context_window)
    }

    /// Lazily yields the media found in `event`.
    ///
    /// Calling again on the same event yields the same sequence.
    pub fn extract<'e>(&'e self, event: &'e ConversationEvent) -> impl Iterator<Item = MediaItem> + 'e {
        let text = event.text.as_str();

        let fences: Rc<Vec<Range<usize>>> = Rc::new(FENCE.find_iter(text).map(|m| m.range()).collect());
        let images: Rc<Vec<Range<usize>>> =
            Rc::new(MD_IMAGE.find_iter(text).map(|m| m.range()).collect());

        let attachment = event
            .attachment
            .as_ref()
            .map(move |a| self.attachment_item(event, a));

        let fences_for_md = Rc::clone(&fences);
        let markdown = MD_IMAGE
            .captures_iter(text)
            .filter(move |c| c.get(0).is_some_and(|m| !inside(&fences_for_md, m.start())))
            .filter_map(move |c| {
                let whole = c.get(0)?;
                let url = c.get(2)?.as_str();
                let alt = c.get(1).map(|m| m.as_str().trim()).filter(|s| !s.is_empty());
                let category = self.image_category(text, whole.range(), url);
                Some(self.item(
                    event,
                    MediaKind::Image,
                    url.to_string(),
                    MediaCategory::Image(category),
                    alt.map(str::to_string),
                    None,
                    None,
                ))
            });

        let fences_for_urls = Rc::clone(&fences);
        let urls = BARE_URL
            .find_iter(text)
            .filter(move |m| !inside(&fences_for_urls, m.start()) && !inside(&images, m.start()))
            .filter_map(move |m| {
                let url = trim_url(m.as_str());
                if url.len() <= "https://".len() {
                    return None;
                }
                let range = m.start()..m.start() + url.len();
                Some(self.url_item(event, text, url, range))
            });

        let code = FENCE.captures_iter(text).filter_map(move |c| {
            let body = c.get(2)?.as_str().trim_matches('\n');
            if body.trim().is_empty() {
                return None;
            }
            let lang = c
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .filter(|s| !s.is_empty());
            Some(self.code_item(event, body, lang))
        });

        let indented = std::iter::once(()).flat_map(move |_| {
            indented_blocks(text, &fences)
                .into_iter()
                .map(move |body| self.code_item(event, &body, None))
        });

        attachment
            .into_iter()
            .chain(markdown)
            .chain(urls)
            .chain(code)
            .chain(indented)
    }

    fn attachment_item(&self, event: &ConversationEvent, att: &Attachment) -> MediaItem {
        let name = att.name.as_deref().unwrap_or_default();
        let is_image = att
            .mimetype
            .as_deref()
            .is_some_and(|m| m.to_ascii_lowercase().starts_with("image/"))
            || self.rules.has_image_extension(name)
            || self.rules.has_image_extension(url_path(&att.url));

        if !is_image {
            return MediaItem {
                thumb_url: att.thumb_url.clone(),
                ..self.item(
                    event,
                    MediaKind::File,
                    att.url.clone(),
                    MediaCategory::None,
                    att.name.clone(),
                    None,
                    None,
                )
            };
        }

        let context = format!("{} {}", event.text, name);
        let category = if self.rules.has_error_keyword(&context) {
            ImageCategory::ErrorImage
        } else if self.rules.looks_like_screenshot(name) || self.rules.looks_like_screenshot(&att.url) {
            ImageCategory::Screenshot
        } else {
            ImageCategory::Generic
        };

        self.item(
            event,
            MediaKind::Image,
            att.url.clone(),
            MediaCategory::Image(category),
            att.name.clone(),
            None,
            att.thumb_url.clone(),
        )
    }

    fn url_item(
        &self,
        event: &ConversationEvent,
        text: &str,
        url: &str,
        range: Range<usize>,
    ) -> MediaItem {
        if self.rules.has_image_extension(url_path(url)) {
            let category = self.image_category(text, range, url);
            return self.item(
                event,
                MediaKind::Image,
                url.to_string(),
                MediaCategory::Image(category),
                None,
                None,
                None,
            );
        }

        let (host, host_and_path) = host_parts(url);
        let (category, label) = self.rules.classify_link(&host, &host_and_path);
        self.item(
            event,
            MediaKind::ReferenceLink,
            url.to_string(),
            MediaCategory::Link(category),
            label.map(str::to_string),
            None,
            None,
        )
    }

    fn code_item(&self, event: &ConversationEvent, body: &str, language: Option<String>) -> MediaItem {
        self.item(
            event,
            MediaKind::CodeSnippet,
            body.to_string(),
            MediaCategory::None,
            None,
            language,
            None,
        )
    }

    /// Error keywords near the image win over screenshot naming.
    fn image_category(&self, text: &str, range: Range<usize>, url: &str) -> ImageCategory {
        if self.rules.has_error_keyword(context_window(text, range, self.window)) {
            ImageCategory::ErrorImage
        } else if self.rules.looks_like_screenshot(url) {
            ImageCategory::Screenshot
        } else {
            ImageCategory::Generic
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn item(
        &self,
        event: &ConversationEvent,
        kind: MediaKind,
        url_or_content: String,
        category: MediaCategory,
        label: Option<String>,
        language: Option<String>,
        thumb_url: Option<String>,
    ) -> MediaItem {
        let dedup_key = dedup_key(kind, &url_or_content);
        MediaItem {
            kind,
            url_or_content,
            category,
            label,
            language,
            thumb_url,
            source_event: event.id.clone(),
            source: event.source,
            dedup_key,
        }
    }
}

/// Fingerprint used to merge the same artifact across sources.
///
/// URLs: `url:` + normalized URL. Code: `code:` + SHA-256 of the trimmed body.
pub fn dedup_key(kind: MediaKind, url_or_content: &str) -> String {
    match kind {
        MediaKind::CodeSnippet => {
            let normalized = url_or_content.replace("\r\n", "\n");
            format!("code:{}", sha_hex(normalized.trim()))
        }
        MediaKind::Image | MediaKind::ReferenceLink | MediaKind::File => {
            format!("url:{}", normalize_url(url_or_content))
        }
    }
}

/// Lower-cases scheme and host, drops the fragment and a trailing `/`.
///
/// Unparseable input is trimmed and lower-cased as a whole.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut u) => {
            u.set_fragment(None);
            let mut s = u.to_string();
            while s.ends_with('/') && !s.ends_with("://") {
                s.pop();
            }
            s
        }
        Err(_) => raw.trim_end_matches('/').to_lowercase(),
    }
}

fn sha_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    format!("{:x}", h.finalize())
}

fn inside(spans: &[Range<usize>], pos: usize) -> bool {
    spans.iter().any(|r| r.contains(&pos))
}

/// Strips trailing sentence punctuation and unbalanced closing parens.
fn trim_url(url: &str) -> &str {
    let mut s = url;
    loop {
        let Some(last) = s.chars().last() else {
            return s;
        };
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '*' | '_' => true,
            ')' => s.matches(')').count() > s.matches('(').count(),
            _ => false,
        };
        if !strip {
            return s;
        }
        s = &s[..s.len() - last.len_utf8()];
    }
}

/// Path component of a URL, or the input when it does not parse.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            match rest.find('/') {
                Some(p) => &rest[p..],
                None => "",
            }
        }
        None => url,
    }
}

/// `(host, host + path)`, lower-cased, for link rule matching.
fn host_parts(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(u) => {
            let host = u.host_str().unwrap_or_default().to_ascii_lowercase();
            let full = format!("{host}{}", u.path().to_ascii_lowercase());
            (host, full)
        }
        Err(_) => {
            let lower = url.to_ascii_lowercase();
            (lower.clone(), lower)
        }
    }
}

/// Slice of `text` extending `window` characters on each side of the byte
/// `range`.
fn context_window(text: &str, range: Range<usize>, window: usize) -> &str {
    let start = text[..range.start]
        .char_indices()
        .rev()
        .take(window)
        .last()
        .map_or(range.start, |(i, _)| i);
    let end = text[range.end..]
        .char_indices()
        .nth(window)
        .map_or(text.len(), |(i, _)| range.end + i);
    &text[start..end]
}

/// Blocks of lines indented by 4 spaces or a tab, preceded by a blank line
/// or the start of the text, outside fenced code.
fn indented_blocks(text: &str, fences: &[Range<usize>]) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut prev_blank = true;
    let mut offset = 0usize;

    for line in text.split('\n') {
        let line_start = offset;
        offset += line.len() + 1;

        let indented = line.starts_with("    ") || line.starts_with('\t');
        let in_fence = inside(fences, line_start);

        if indented && !in_fence && (prev_blank || !current.is_empty()) && !line.trim().is_empty() {
            current.push(line.strip_prefix('\t').or_else(|| line.strip_prefix("    ")).unwrap_or(line));
            prev_blank = false;
            continue;
        }

        if !current.is_empty() {
            out.push(current.join("\n"));
            current.clear();
        }
        prev_blank = line.trim().is_empty();
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}
