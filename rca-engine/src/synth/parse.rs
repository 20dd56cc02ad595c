//! Tolerant parsing of model output into the four RCA sections.
//!
//! JSON is tried first (optionally fenced, with raw newlines inside strings
//! repaired). JSON that still does not parse, typically a reply cut off at
//! the token limit or one with unescaped quotes, is read key by key.
//! Otherwise each section is located by its label at line start and runs up
//! to the next known label. A missing label yields `None`; the caller
//! substitutes the fallback.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::model::RcaSection;

/// Parsed section values in [`RcaSection::ALL`] order.
pub type Sections = [Option<String>; 4];

lazy_static! {
    /// Labels at line start, with optional markdown decoration. Group 1 holds
    /// a full section title, which may be numbered (`3. Steps to Resolution`);
    /// group 2 a short alias, which may not, so a numbered step such as
    /// `2. Root cause: ...` stays inside its list.
    static ref LABEL: Regex = Regex::new(
        r"(?mi)^[ \t>#*_\-]*(?:(?:\d+[.)][ \t]*)?[*_]*[ \t]*(summary of the issue|steps to debug|steps to resolution|root cause analysis)|[*_]*[ \t]*(summary|debugging steps|debug steps|resolution steps|resolution|root cause))[ \t]*[*_]*[ \t]*(?::[ \t]*[*_]*|[ \t]*$)"
    )
    .unwrap();
    /// A section key opening a JSON member.
    static ref JSON_KEY: Regex = Regex::new(
        r#"(?:^|[{,])\s*"(summary|debug_steps|resolution_steps|root_cause)"\s*:\s*"#
    )
    .unwrap();
    static ref INLINE_STEP: Regex = Regex::new(r"([^\n])[ \t]+(\d{1,2})\.[ \t]+(\p{Lu})").unwrap();
    static ref LINE_STEP: Regex = Regex::new(r"\n(\d{1,2})\.[ \t]+").unwrap();
    static ref FENCE_THEN_STEP: Regex = Regex::new(r"(?s)(```[^`]*```)[ \t\n]*(\d{1,2}\.)").unwrap();
    static ref EXTRA_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
}

fn section_for_label(label: &str) -> Option<RcaSection> {
    match label.to_lowercase().as_str() {
        "summary of the issue" | "summary" => Some(RcaSection::Summary),
        "steps to debug" | "debugging steps" | "debug steps" => Some(RcaSection::DebugSteps),
        "steps to resolution" | "resolution steps" | "resolution" => {
            Some(RcaSection::ResolutionSteps)
        }
        "root cause analysis" | "root cause" => Some(RcaSection::RootCause),
        _ => None,
    }
}

fn index_of(section: RcaSection) -> usize {
    match section {
        RcaSection::Summary => 0,
        RcaSection::DebugSteps => 1,
        RcaSection::ResolutionSteps => 2,
        RcaSection::RootCause => 3,
    }
}

/// Extracts the four sections from raw model output.
pub fn parse_sections(raw: &str) -> Sections {
    let cleaned = cleanup_json_like(raw);
    if let Some(sections) = parse_json(&cleaned) {
        return sections;
    }
    if let Some(sections) = parse_json_fields(&cleaned) {
        return sections;
    }
    parse_labeled(&cleaned)
}

/// Strips a surrounding ```json fence.
fn cleanup_json_like(s: &str) -> String {
    let mut t = s.trim().to_string();
    if t.starts_with("```") {
        t = t
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .to_string();
        if let Some(pos) = t.rfind("```") {
            t.truncate(pos);
        }
    }
    t.trim().to_string()
}

fn parse_json(text: &str) -> Option<Sections> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let span = &text[start..=end];

    let value: Value = serde_json::from_str(span)
        .or_else(|_| serde_json::from_str(&escape_controls_in_strings(span)))
        .ok()?;
    let obj = value.as_object()?;

    let mut out: Sections = Default::default();
    let mut found = false;
    for section in RcaSection::ALL {
        let v = obj.get(section.json_key()).or_else(|| {
            obj.iter()
                .find(|(k, _)| section_for_label(&k.replace('_', " ")) == Some(section))
                .map(|(_, v)| v)
        });
        if let Some(v) = v {
            found = true;
            out[index_of(section)] = Some(json_text(v));
        }
    }
    found.then_some(out)
}

/// Reads section values from JSON that serde rejects. Each value runs from
/// its key to the next section key, or to the end of the text when the reply
/// was cut off.
fn parse_json_fields(text: &str) -> Option<Sections> {
    let keys: Vec<(RcaSection, usize, usize)> = JSON_KEY
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str();
            let section = RcaSection::ALL.into_iter().find(|s| s.json_key() == key)?;
            Some((section, whole.start(), whole.end()))
        })
        .collect();
    if keys.is_empty() {
        return None;
    }

    let mut out: Sections = Default::default();
    for (i, (section, _, value_start)) in keys.iter().enumerate() {
        let slot = &mut out[index_of(*section)];
        if slot.is_some() {
            continue;
        }
        let value_end = keys.get(i + 1).map_or(text.len(), |k| k.1);
        *slot = Some(loose_json_value(&text[*value_start..value_end]));
    }
    Some(out)
}

/// One member value, possibly unterminated or with raw quotes inside.
fn loose_json_value(raw: &str) -> String {
    let mut v = raw.trim();
    v = v.strip_suffix("```").unwrap_or(v).trim_end();
    v = v.strip_suffix('}').unwrap_or(v).trim_end();
    v = v.strip_suffix(',').unwrap_or(v).trim_end();

    if v.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(v) {
            return json_text(&parsed);
        }
    }
    match v.strip_prefix('"') {
        Some(inner) => {
            let inner = inner.strip_suffix('"').unwrap_or(inner);
            unescape_json(inner).trim().to_string()
        }
        None if v == "null" => String::new(),
        None => v.to_string(),
    }
}

/// Resolves JSON string escapes; a dangling backslash is dropped.
fn unescape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => {}
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn json_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(json_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Escapes raw newlines/tabs inside JSON strings and drops other control chars.
fn escape_controls_in_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            if !c.is_control() || c == '\n' || c == '\t' {
                out.push(c);
            }
        }
    }
    out
}

fn parse_labeled(text: &str) -> Sections {
    // (section, start, content start, full title)
    let mut headers: Vec<(RcaSection, usize, usize, bool)> = Vec::new();
    for caps in LABEL.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let (label, full) = match (caps.get(1), caps.get(2)) {
            (Some(title), _) => (title, true),
            (None, Some(alias)) => (alias, false),
            (None, None) => continue,
        };
        if let Some(section) = section_for_label(label.as_str()) {
            headers.push((section, whole.start(), whole.end(), full));
        }
    }

    // Once a section has its full title, aliases of it are body text.
    let mut titled = [false; 4];
    for (section, _, _, full) in &headers {
        titled[index_of(*section)] |= *full;
    }
    headers.retain(|(section, _, _, full)| *full || !titled[index_of(*section)]);

    let mut out: Sections = Default::default();
    for (i, (section, _, content_start, _)) in headers.iter().enumerate() {
        let slot = &mut out[index_of(*section)];
        if slot.is_some() {
            continue;
        }
        let content_end = headers.get(i + 1).map_or(text.len(), |h| h.1);
        let body = text[*content_start..content_end]
            .trim()
            .trim_end_matches(['*', '_', '#'])
            .trim();
        *slot = Some(body.to_string());
    }
    out
}

/// Puts numbered steps on their own paragraphs and tidies blank lines.
pub fn format_steps(text: &str) -> String {
    let s = INLINE_STEP.replace_all(text, "$1\n\n$2. $3");
    let s = LINE_STEP.replace_all(&s, "\n\n$1. ");
    let s = FENCE_THEN_STEP.replace_all(&s, "$1\n\n$2");
    let s = EXTRA_NEWLINES.replace_all(&s, "\n\n");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fenced_json_is_parsed() {
        let raw = "```json\n{\"summary\": \"DB down\", \"debug_steps\": \"1. Checked logs\", \"resolution_steps\": \"Restarted\", \"root_cause\": \"Disk full\"}\n```";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("DB down"));
        assert_eq!(s[3].as_deref(), Some("Disk full"));
    }

    #[test]
    fn json_with_raw_newlines_is_repaired() {
        let raw = "Here you go:\n{\"summary\": \"line one\nline two\", \"root_cause\": \"x\"}";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("line one\nline two"));
        assert_eq!(s[1], None);
        assert_eq!(s[3].as_deref(), Some("x"));
    }

    #[test]
    fn truncated_json_keeps_what_arrived() {
        let raw = r#"{"summary": "DB down", "debug_steps": "1. Checked logs", "resolution_steps": "Restarted", "root_cause": "Disk fu"#;
        let s = parse_sections(raw);
        assert_eq!(
            s,
            [
                Some("DB down".to_string()),
                Some("1. Checked logs".to_string()),
                Some("Restarted".to_string()),
                Some("Disk fu".to_string()),
            ]
        );
    }

    #[test]
    fn json_with_unescaped_quotes_is_read_per_key() {
        let raw = r#"{"summary": "Login said "invalid token" for all users", "debug_steps": "1. Decoded the JWT\n2. Compared kid", "root_cause": "Signing key rotated"}"#;
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some(r#"Login said "invalid token" for all users"#));
        assert_eq!(s[1].as_deref(), Some("1. Decoded the JWT\n2. Compared kid"));
        assert_eq!(s[2], None);
        assert_eq!(s[3].as_deref(), Some("Signing key rotated"));
    }

    #[test]
    fn cut_off_fenced_json_with_list_value() {
        let raw = "```json\n{\"summary\": \"Queue stuck\", \"debug_steps\": [\"Checked lag\", \"Dumped offsets\"], \"resolution_steps\": \"Reset off";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("Queue stuck"));
        assert_eq!(s[1].as_deref(), Some("Checked lag\nDumped offsets"));
        assert_eq!(s[2].as_deref(), Some("Reset off"));
        assert_eq!(s[3], None);
    }

    #[test]
    fn numbered_step_mentioning_a_label_stays_in_its_list() {
        let raw = "Summary: API slow\nSteps to Debug:\n1. Checked grafana\n2. Root cause: suspected the pool size\n3. Read pool metrics\nSteps to Resolution: raised pool size\nRoot Cause: connection pool exhausted";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("API slow"));
        assert_eq!(
            s[1].as_deref(),
            Some("1. Checked grafana\n2. Root cause: suspected the pool size\n3. Read pool metrics")
        );
        assert_eq!(s[2].as_deref(), Some("raised pool size"));
        assert_eq!(s[3].as_deref(), Some("connection pool exhausted"));
    }

    #[test]
    fn full_title_wins_over_alias_in_bullets() {
        let raw = "Steps to Debug:\n- Resolution: a restart did not help\n- Checked pool\nSteps to Resolution: raised pool size";
        let s = parse_sections(raw);
        assert_eq!(
            s[1].as_deref(),
            Some("- Resolution: a restart did not help\n- Checked pool")
        );
        assert_eq!(s[2].as_deref(), Some("raised pool size"));
    }

    #[test]
    fn labeled_sections_in_any_order() {
        let raw = "## Root Cause Analysis\nExpired cert.\n\n**Summary of the Issue**: TLS errors on login\n\n3. Steps to Resolution:\nRotated the cert\n\nSteps to Debug:\n1. Checked logs\n2. Ran openssl";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("TLS errors on login"));
        assert_eq!(s[1].as_deref(), Some("1. Checked logs\n2. Ran openssl"));
        assert_eq!(s[2].as_deref(), Some("Rotated the cert"));
        assert_eq!(s[3].as_deref(), Some("Expired cert."));
    }

    #[test]
    fn missing_root_cause_label_is_none() {
        let raw = "Summary: API timeouts\nDebug Steps: checked grafana\nResolution: scaled pods";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("API timeouts"));
        assert_eq!(s[1].as_deref(), Some("checked grafana"));
        assert_eq!(s[2].as_deref(), Some("scaled pods"));
        assert_eq!(s[3], None);
    }

    #[test]
    fn label_words_inside_sentences_are_not_headers() {
        let raw = "Summary: the summary of logs: nothing\nRoot Cause: the resolution was slow";
        let s = parse_sections(raw);
        assert_eq!(s[0].as_deref(), Some("the summary of logs: nothing"));
        assert_eq!(s[2], None);
        assert_eq!(s[3].as_deref(), Some("the resolution was slow"));
    }

    #[test]
    fn empty_section_is_kept_empty() {
        let s = parse_sections("Summary:\nRoot Cause: dns");
        assert_eq!(s[0].as_deref(), Some(""));
    }

    #[test]
    fn garbage_yields_no_sections() {
        assert_eq!(parse_sections("I cannot help with that."), Sections::default());
    }

    #[test]
    fn steps_get_blank_lines() {
        let out = format_steps("1. Checked logs 2. Restarted pod\n3. Verified\n\n\n\nDone");
        assert_eq!(out, "1. Checked logs\n\n2. Restarted pod\n\n3. Verified\n\nDone");
        let out = format_steps("```\nkubectl get pods\n``` 2. Next");
        assert_eq!(out, "```\nkubectl get pods\n```\n\n2. Next");
    }
}
