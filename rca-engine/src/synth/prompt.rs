//! Prompt assembly for single, partial and reduce calls.

use std::fmt::Write as _;

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::{ConversationBundle, RcaSection};
use crate::synth::TicketContext;

pub const SYSTEM_PROMPT: &str = "You are creating RCA (Root Cause Analysis) reports from support tickets.
Analyze the conversation and create a structured report based on what actually happened.
Only include information that is present in the conversation.
If no debugging steps are mentioned, say so.
If no resolution is mentioned, say so.
Do not make assumptions or add information not in the conversation.";

const MAX_ERROR_LINES: usize = 5;
const MAX_COMMANDS: usize = 10;
const MAX_DIGEST_LINE: usize = 200;

lazy_static! {
    static ref ERROR_LINE: Regex = Regex::new(
        r"(?m)((?:[Ee]rror|[Ee]xception|[Ff]ailed|[Ww]arning):\s*[^\n]+|FATAL:\s*[^\n]+|ERROR\s+\[\d+\]:[^\n]+|\[ERROR\][^\n]+|Traceback[^\n]+|panic:[^\n]+|fatal:[^\n]+)"
    )
    .unwrap();
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`\n]+)`").unwrap();
}

const SECTION_INSTRUCTIONS: &str = "1. **Summary of the Issue**:
   - What problem was reported?
   - Include any error messages or symptoms mentioned
   - Be specific about what wasn't working

2. **Steps to Debug**:
   - List the actual debugging actions taken (numbered list)
   - Include any commands run or checks performed
   - Format commands in code blocks
   - If no debugging steps are mentioned, state: \"No debugging steps were documented in the conversation.\"

3. **Steps to Resolution**:
   - What was done to fix the issue?
   - Include specific actions taken
   - Format commands in code blocks
   - If no resolution is mentioned, state: \"No resolution steps were documented in the conversation.\"

4. **Root Cause Analysis**:
   - What caused the issue based on the investigation?
   - Be specific if the cause was identified
   - If not identified, state: \"Root cause was not identified in the conversation.\"";

const OUTPUT_RULES: &str = "IMPORTANT:
- Only include information actually present in the conversation
- Use proper formatting with line breaks between numbered steps
- Put actual commands/code in ``` blocks
- Do not make up or assume steps that aren't mentioned

Return as JSON:
{\"summary\": \"...\", \"debug_steps\": \"...\", \"resolution_steps\": \"...\", \"root_cause\": \"...\"}";

fn header(ctx: &TicketContext) -> String {
    let engineers = if ctx.engineers.is_empty() {
        "Support Team".to_string()
    } else {
        ctx.engineers.join(", ")
    };
    format!(
        "TICKET: {}\nSTATUS: {}\nENGINEERS: {}\n\nTECHNICAL CONTENT FOUND:\n{}\n",
        or_na(&ctx.title),
        or_na(&ctx.status),
        engineers,
        ctx.digest
    )
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() { "N/A" } else { s }
}

/// Prompt for a conversation that fit in one chunk.
pub fn single_prompt(ctx: &TicketContext, conversation: &str, incomplete: bool) -> String {
    let mut p = String::from("Analyze this support ticket conversation and create an RCA report.\n\n");
    p.push_str(&header(ctx));
    if incomplete {
        p.push_str("\nNOTE: part of the conversation was elided for length; mention uncertainty where it matters.\n");
    }
    let _ = write!(
        p,
        "\nCONVERSATION:\n{conversation}\n\nBased on the conversation above, create an RCA report with these sections:\n\n{SECTION_INSTRUCTIONS}\n\n{OUTPUT_RULES}"
    );
    p
}

/// Prompt for one slice of a conversation that was split.
pub fn partial_prompt(
    ctx: &TicketContext,
    conversation: &str,
    index: usize,
    total: usize,
    incomplete: bool,
) -> String {
    let mut p = format!(
        "This is part {} of {} of a long support ticket conversation. Extract a partial RCA from this part only.\n\n",
        index + 1,
        total
    );
    p.push_str(&header(ctx));
    if incomplete {
        p.push_str("\nNOTE: an oversized message in this part was elided.\n");
    }
    let _ = write!(
        p,
        "\nCONVERSATION (PART {}/{}):\n{conversation}\n\nFill in only what this part shows; leave a section empty when this part says nothing about it.\n\n{SECTION_INSTRUCTIONS}\n\n{OUTPUT_RULES}",
        index + 1,
        total
    );
    p
}

/// Prompt merging partial analyses into one RCA.
pub fn reduce_prompt(ctx: &TicketContext, partials: &[[Option<String>; 4]]) -> String {
    let mut p = String::from(
        "The conversation below was analyzed in parts. Merge the partial analyses into one RCA report, keeping chronological order of steps and removing repetition.\n\n",
    );
    p.push_str(&header(ctx));
    for (i, sections) in partials.iter().enumerate() {
        let _ = writeln!(p, "\nPARTIAL ANALYSIS {}:", i + 1);
        for (section, value) in RcaSection::ALL.iter().zip(sections.iter()) {
            let value = value.as_deref().filter(|v| !v.trim().is_empty()).unwrap_or("(nothing)");
            let _ = writeln!(p, "{}: {}", section.title(), value);
        }
    }
    let _ = write!(p, "\n{SECTION_INSTRUCTIONS}\n\n{OUTPUT_RULES}");
    p
}

/// Short digest of error lines, commands and media counts for the prompt header.
pub fn technical_digest(bundle: &ConversationBundle) -> String {
    let mut errors: Vec<String> = Vec::new();
    let mut commands: Vec<String> = Vec::new();

    for e in bundle.events.iter().filter(|e| !e.is_bot) {
        for m in ERROR_LINE.find_iter(&e.text) {
            let line = clip(m.as_str().trim());
            if errors.len() < MAX_ERROR_LINES && !errors.contains(&line) {
                errors.push(line);
            }
        }
        for c in INLINE_CODE.captures_iter(&e.text) {
            let Some(code) = c.get(1).map(|m| m.as_str().trim()) else {
                continue;
            };
            let looks_like_command = code.chars().count() > 5
                && code.contains([' ', '/', '-', '.', '(', ')', '=']);
            let code = clip(code);
            if looks_like_command && commands.len() < MAX_COMMANDS && !commands.contains(&code) {
                commands.push(code);
            }
        }
    }

    let summary = bundle.media_summary();
    let mut parts: Vec<String> = Vec::new();
    if !errors.is_empty() {
        parts.push("Errors found:".to_string());
        parts.extend(errors.into_iter().map(|e| format!("- {e}")));
    }
    if !commands.is_empty() {
        parts.push("Commands found:".to_string());
        parts.extend(commands.into_iter().map(|c| format!("- {c}")));
    }
    if summary.code_snippets > 0 {
        parts.push(format!("{} code blocks found", summary.code_snippets));
    }
    let tech_links = summary.console_links + summary.dashboard_links;
    if tech_links > 0 {
        parts.push(format!("{tech_links} console/dashboard links found"));
    }
    if summary.error_images > 0 {
        parts.push(format!("{} error screenshots attached", summary.error_images));
    }

    if parts.is_empty() {
        "No technical content extracted".to_string()
    } else {
        parts.join("\n")
    }
}

fn clip(s: &str) -> String {
    if s.chars().count() <= MAX_DIGEST_LINE {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(MAX_DIGEST_LINE).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationEvent, EventId, SourceKind};
    use chrono::{TimeZone, Utc};

    fn bundle(texts: &[(&str, bool)]) -> ConversationBundle {
        let events = texts
            .iter()
            .enumerate()
            .map(|(i, (t, bot))| ConversationEvent {
                id: EventId::new(SourceKind::ChatMessage, &i.to_string()),
                source: SourceKind::ChatMessage,
                author: "ann".into(),
                timestamp: Utc.timestamp_opt(i as i64, 0).unwrap(),
                text: t.to_string(),
                is_bot: *bot,
                raw_ref: i.to_string(),
                seq: i,
                attachment: None,
            })
            .collect();
        ConversationBundle {
            events,
            media: Vec::new(),
            total_chars: 0,
        }
    }

    fn ctx() -> TicketContext {
        TicketContext {
            id: "T1".into(),
            title: "Checkout fails".into(),
            status: "complete".into(),
            engineers: vec!["ann".into(), "bob".into()],
            digest: "No technical content extracted".into(),
        }
    }

    #[test]
    fn digest_lists_errors_and_commands_from_humans_only() {
        let b = bundle(&[
            ("Error: connection refused on port 5432", false),
            ("ran `kubectl get pods -n prod` twice", false),
            ("panic: bot-only failure", true),
        ]);
        let d = technical_digest(&b);
        assert!(d.contains("- Error: connection refused on port 5432"));
        assert!(d.contains("- kubectl get pods -n prod"));
        assert!(!d.contains("bot-only"));
    }

    #[test]
    fn empty_digest_has_placeholder() {
        assert_eq!(technical_digest(&bundle(&[("thanks", false)])), "No technical content extracted");
    }

    #[test]
    fn prompts_carry_header_and_format() {
        let p = single_prompt(&ctx(), "[..] ann (chat): hi", true);
        assert!(p.contains("TICKET: Checkout fails"));
        assert!(p.contains("ENGINEERS: ann, bob"));
        assert!(p.contains("elided"));
        assert!(p.contains("\"root_cause\""));

        let p = partial_prompt(&ctx(), "text", 1, 3, false);
        assert!(p.contains("part 2 of 3"));

        let p = reduce_prompt(&ctx(), &[[Some("s".into()), None, None, Some("rc".into())]]);
        assert!(p.contains("Summary of the Issue: s"));
        assert!(p.contains("Steps to Debug: (nothing)"));
    }
}
