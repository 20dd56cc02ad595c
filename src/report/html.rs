//! HTML rendering of a run.
//!
//! Tickets are grouped by customer (alphabetical), each group keeps the
//! processing order. Every piece of ticket or model text goes through
//! [`escape`]; URLs additionally through [`safe_url`].

use std::collections::BTreeMap;

use incident_sources::TicketSummary;
use rca_engine::{
    ConversationBundle, ImageCategory, LinkCategory, MediaItem, MediaKind, RcaResult, RcaSection,
    RcaStatus, TicketAnalysis,
};

use super::{ReportInput, escape};
use crate::run::TicketOutcome;

const MAX_LINKS: usize = 10;
const MAX_IMAGES: usize = 10;
const MAX_SNIPPETS: usize = 3;
const MAX_SNIPPET_CHARS: usize = 500;

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0; background: #f3f4f6; color: #1f2937; }
.header { background: linear-gradient(135deg, #0f766e 0%, #14b8a6 100%); color: white; padding: 28px 40px; display: flex; justify-content: space-between; align-items: center; }
.header h1 { margin: 0; font-size: 1.6rem; }
.stats { display: flex; gap: 28px; }
.stat-number { font-size: 1.6rem; font-weight: 700; text-align: center; }
.stat-label { font-size: 0.8rem; opacity: 0.85; }
.container { max-width: 1300px; margin: 24px auto; padding: 0 20px; }
.customer-section { background: white; border-radius: 10px; margin-bottom: 24px; overflow: hidden; box-shadow: 0 1px 3px rgba(0,0,0,0.08); }
.customer-head { background: #f8f9fa; padding: 18px 24px; display: flex; justify-content: space-between; align-items: center; }
.customer-head h2 { margin: 0; font-size: 1.2rem; }
.pill { color: white; padding: 5px 12px; border-radius: 16px; font-size: 0.8rem; margin-left: 8px; }
.pill-total { background: #14b8a6; } .pill-done { background: #10b981; } .pill-open { background: #f59e0b; }
table { width: 100%; border-collapse: collapse; }
th { text-align: left; background: #f9fafb; padding: 10px 14px; font-size: 0.8rem; color: #6b7280; }
td { padding: 10px 14px; border-top: 1px solid #e5e7eb; vertical-align: top; font-size: 0.9rem; }
tr.expandable { cursor: pointer; } tr.expandable:hover { background: #f0fdfa; }
.badge { display: inline-block; margin-left: 6px; padding: 2px 8px; border-radius: 10px; font-size: 0.72rem; background: #e5e7eb; }
.badge-chat { background: #ede9fe; color: #6d28d9; } .badge-images { background: #dbeafe; color: #1d4ed8; }
.badge-links { background: #fef3c7; color: #b45309; } .badge-time { background: #dcfce7; color: #15803d; }
.status { padding: 3px 9px; border-radius: 6px; font-size: 0.78rem; font-weight: 600; }
.status-complete { background: #d1fae5; color: #065f46; } .status-customer-fix { background: #e0f2fe; color: #075985; }
.status-invalid { background: #f3f4f6; color: #4b5563; } .status-external { background: #fee2e2; color: #991b1b; }
.status-blocked { background: #fecaca; color: #7f1d1d; } .status-progress { background: #dbeafe; color: #1e40af; }
.status-waiting { background: #fef3c7; color: #92400e; } .status-qa { background: #ede9fe; color: #5b21b6; }
.status-signoff { background: #cffafe; color: #155e75; } .status-open { background: #fff7ed; color: #9a3412; }
.details { background: #f9fafb; padding: 20px 48px; border-left: 4px solid #14b8a6; }
.facts { display: grid; grid-template-columns: repeat(3, 1fr); gap: 14px; background: white; padding: 14px; border-radius: 6px; margin-bottom: 20px; }
.rca-block { margin-bottom: 18px; } .rca-block h4 { margin: 0 0 6px 0; }
.rca-content { background: white; padding: 12px; border-radius: 6px; line-height: 1.5; }
.notice { background: #fff7ed; border: 1px solid #fdba74; color: #9a3412; padding: 12px; border-radius: 6px; margin-bottom: 18px; }
.reference-link { display: block; padding: 4px 0; color: #0f766e; word-break: break-all; }
.media-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 12px; }
.media-item { background: white; border: 1px solid #e5e7eb; border-radius: 6px; overflow: hidden; }
.media-item img { width: 100%; height: 120px; object-fit: cover; display: block; }
.media-item-info { font-size: 0.75rem; padding: 6px; color: #4b5563; }
.media-error { border-color: #f87171; }
.code-snippet { background: #0f172a; color: #e2e8f0; padding: 12px; border-radius: 6px; margin-bottom: 10px; overflow-x: auto; }
.code-snippet pre { margin: 8px 0 0 0; white-space: pre-wrap; }
.skipped td { color: #6b7280; }
.empty { text-align: center; color: #6b7280; padding: 40px; }
"#;

const SCRIPT: &str = r#"
function toggleDetails(id) {
  var row = document.getElementById('details_' + id);
  if (row) { row.style.display = row.style.display === 'none' ? 'table-row' : 'none'; }
}
"#;

/// Renders the whole document.
pub fn render(input: &ReportInput<'_>) -> String {
    let analyzed: Vec<Analyzed<'_>> = input
        .outcomes
        .iter()
        .filter_map(|o| match o {
            TicketOutcome::Analyzed {
                summary,
                analysis,
                has_chat,
                ..
            } => Some(Analyzed {
                summary,
                analysis,
                has_chat: *has_chat,
            }),
            TicketOutcome::Skipped { .. } => None,
        })
        .collect();

    let mut by_customer: BTreeMap<&str, Vec<&Analyzed<'_>>> = BTreeMap::new();
    for t in &analyzed {
        by_customer.entry(t.summary.customer.as_str()).or_default().push(t);
    }

    let completed = analyzed.iter().filter(|t| t.summary.is_completed).count();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!(
        "<title>RCA Report {}</title>\n<style>{STYLE}</style>\n<script>{SCRIPT}</script>\n</head>\n<body>\n",
        escape(&input.range_label)
    ));

    out.push_str(&format!(
        concat!(
            "<div class=\"header\"><div><h1>Root Cause Analysis Report</h1>",
            "<div>{range}</div><div style=\"font-size:0.8rem;opacity:0.85\">Generated {generated}</div></div>",
            "<div class=\"stats\">{total}{done}{open}{customers}</div></div>\n",
            "<div class=\"container\">\n"
        ),
        range = escape(&input.range_label),
        generated = input.generated_at.format("%Y-%m-%d %H:%M UTC"),
        total = stat(input.outcomes.len(), "Total Tickets"),
        done = stat(completed, "Closed/Done"),
        open = stat(analyzed.len() - completed, "Open"),
        customers = stat(by_customer.len(), "Customers"),
    ));

    if input.outcomes.is_empty() {
        out.push_str("<div class=\"customer-section empty\">No tickets in this period</div>\n");
    }

    for (group, (customer, tickets)) in by_customer.iter().enumerate() {
        render_customer(&mut out, group, customer, tickets);
    }

    render_skipped(&mut out, input.outcomes);

    out.push_str("</div>\n</body>\n</html>\n");
    out
}

struct Analyzed<'a> {
    summary: &'a TicketSummary,
    analysis: &'a TicketAnalysis,
    has_chat: bool,
}

fn stat(n: usize, label: &str) -> String {
    format!("<div><div class=\"stat-number\">{n}</div><div class=\"stat-label\">{label}</div></div>")
}

fn render_customer(out: &mut String, group: usize, customer: &str, tickets: &[&Analyzed<'_>]) {
    let done = tickets.iter().filter(|t| t.summary.is_completed).count();
    let open = tickets.len() - done;

    out.push_str(&format!(
        "<div class=\"customer-section\">\n<div class=\"customer-head\"><h2>{}</h2><div>\
         <span class=\"pill pill-total\">{} tickets</span>",
        escape(customer),
        tickets.len()
    ));
    if done > 0 {
        out.push_str(&format!("<span class=\"pill pill-done\">{done} closed/done</span>"));
    }
    if open > 0 {
        out.push_str(&format!("<span class=\"pill pill-open\">{open} open</span>"));
    }
    out.push_str(
        "</div></div>\n<table>\n<tr><th width=\"50\">#</th><th>Title</th><th width=\"90\">Ticket</th>\
         <th width=\"100\">Date</th><th width=\"140\">Status</th><th width=\"140\">Owner</th></tr>\n",
    );

    for (i, t) in tickets.iter().enumerate() {
        let row_id = format!("g{group}_{i}");
        render_ticket(out, &row_id, i + 1, customer, t);
    }
    out.push_str("</table>\n</div>\n");
}

fn render_ticket(out: &mut String, row_id: &str, n: usize, customer: &str, t: &Analyzed<'_>) {
    let s = t.summary;
    let bundle = &t.analysis.bundle;
    let result = &t.analysis.result;
    let date = s.created_at.format("%Y-%m-%d").to_string();
    let resolution = s.resolution_time();

    out.push_str(&format!(
        "<tr class=\"expandable\" onclick=\"toggleDetails('{row_id}')\">\
         <td>&#9654; {n}</td><td>{title}{badges}</td>\
         <td><a href=\"{url}\" target=\"_blank\" onclick=\"event.stopPropagation()\">View</a></td>\
         <td>{date}</td><td><span class=\"status {class}\">{status}</span></td><td>{owner}</td></tr>\n",
        title = escape(&s.title),
        badges = badges(bundle, t.has_chat, resolution.as_deref()),
        url = safe_url(s.url.as_deref().unwrap_or("#")),
        class = status_class(&s.status, s.is_completed),
        status = escape(&s.status),
        owner = escape(&s.owner),
    ));

    out.push_str(&format!(
        "<tr id=\"details_{row_id}\" style=\"display: none;\"><td colspan=\"6\" style=\"padding: 0;\">\
         <div class=\"details\">\n<div class=\"facts\">\
         <div><strong>Customer:</strong><br>{customer}</div>\
         <div><strong>Date:</strong><br>{date}</div>\
         <div><strong>Status:</strong><br>{status}</div>\
         <div><strong>Owner:</strong><br>{owner}</div>\
         <div><strong>Ticket ID:</strong><br>{id}</div>\
         <div><strong>Resolution Time:</strong><br>{resolution}</div></div>\n",
        customer = escape(customer),
        status = escape(&s.status),
        owner = escape(&s.owner),
        id = escape(&s.id),
        resolution = escape(resolution.as_deref().unwrap_or("N/A")),
    ));

    render_sections(out, result);
    render_links(out, bundle);
    render_images(out, bundle);
    render_snippets(out, bundle);

    out.push_str("</div></td></tr>\n");
}

fn badges(bundle: &ConversationBundle, has_chat: bool, resolution: Option<&str>) -> String {
    let media = bundle.media_summary();
    let mut b = String::new();
    if has_chat {
        b.push_str("<span class=\"badge badge-chat\">Chat</span>");
    }
    if media.images > 0 {
        b.push_str(&format!("<span class=\"badge badge-images\">{} img</span>", media.images));
    }
    if media.links() > 0 {
        b.push_str(&format!("<span class=\"badge badge-links\">{} links</span>", media.links()));
    }
    if let Some(r) = resolution {
        b.push_str(&format!("<span class=\"badge badge-time\">{}</span>", escape(r)));
    }
    b
}

fn render_sections(out: &mut String, result: &RcaResult) {
    if let RcaStatus::Unavailable { reason } = &result.status {
        out.push_str(&format!(
            "<div class=\"notice\"><strong>Analysis unavailable</strong><br>{}</div>\n",
            escape(reason)
        ));
        return;
    }
    if result.incomplete_context {
        out.push_str(
            "<div class=\"notice\">Part of the conversation was truncated before analysis.</div>\n",
        );
    }
    for section in RcaSection::ALL {
        out.push_str(&format!(
            "<div class=\"rca-block\"><h4>{}</h4><div class=\"rca-content\">{}</div></div>\n",
            section.title(),
            multiline(result.section(section))
        ));
    }
}

fn render_links(out: &mut String, bundle: &ConversationBundle) {
    let mut links: Vec<&MediaItem> = bundle
        .media
        .iter()
        .filter(|m| m.kind == MediaKind::ReferenceLink)
        .collect();
    if links.is_empty() {
        return;
    }
    links.sort_by_key(|m| match m.link_category() {
        Some(LinkCategory::Console) => 0,
        Some(LinkCategory::Dashboard) => 1,
        _ => 2,
    });

    out.push_str("<div class=\"rca-block\"><h4>Reference Links</h4><div class=\"rca-content\">\n");
    for link in links.iter().take(MAX_LINKS) {
        let text = link.label.as_deref().unwrap_or(&link.url_or_content);
        out.push_str(&format!(
            "<a class=\"reference-link\" href=\"{}\" target=\"_blank\">{}</a>\n",
            safe_url(&link.url_or_content),
            escape(text)
        ));
    }
    out.push_str("</div></div>\n");
}

fn render_images(out: &mut String, bundle: &ConversationBundle) {
    let mut images: Vec<&MediaItem> = bundle
        .media
        .iter()
        .filter(|m| m.kind == MediaKind::Image)
        .collect();
    if images.is_empty() {
        return;
    }
    images.sort_by_key(|m| match m.image_category() {
        Some(ImageCategory::ErrorImage) => 0,
        Some(ImageCategory::Screenshot) => 1,
        _ => 2,
    });

    out.push_str("<div class=\"rca-block\"><h4>Attached Images</h4><div class=\"media-grid\">\n");
    for img in images.iter().take(MAX_IMAGES) {
        let is_error = img.image_category() == Some(ImageCategory::ErrorImage);
        let title = img.label.as_deref().unwrap_or(if is_error { "Error" } else { "Image" });
        let thumb = img.thumb_url.as_deref().unwrap_or(&img.url_or_content);
        out.push_str(&format!(
            "<a class=\"media-item{err}\" href=\"{url}\" target=\"_blank\">\
             <img src=\"{thumb}\" alt=\"{alt}\" loading=\"lazy\">\
             <div class=\"media-item-info\">{info}</div></a>\n",
            err = if is_error { " media-error" } else { "" },
            url = safe_url(&img.url_or_content),
            thumb = safe_url(thumb),
            alt = escape(title),
            info = escape(&shorten(title, 30)),
        ));
    }
    out.push_str("</div></div>\n");
}

fn render_snippets(out: &mut String, bundle: &ConversationBundle) {
    let snippets: Vec<&MediaItem> = bundle
        .media
        .iter()
        .filter(|m| m.kind == MediaKind::CodeSnippet)
        .take(MAX_SNIPPETS)
        .collect();
    if snippets.is_empty() {
        return;
    }

    out.push_str("<div class=\"rca-block\"><h4>Commands/Code Used</h4>\n");
    for snip in snippets {
        let author = bundle
            .event(&snip.source_event)
            .map(|e| e.author.as_str())
            .unwrap_or("Unknown");
        let code = &snip.url_or_content;
        let mut body: String = code.chars().take(MAX_SNIPPET_CHARS).collect();
        if code.chars().count() > MAX_SNIPPET_CHARS {
            body.push_str("...");
        }
        out.push_str(&format!(
            "<div class=\"code-snippet\"><small>Shared by {}</small><pre>{}</pre></div>\n",
            escape(author),
            escape(&body)
        ));
    }
    out.push_str("</div>\n");
}

fn render_skipped(out: &mut String, outcomes: &[TicketOutcome]) {
    let skipped: Vec<(&str, &str, &str)> = outcomes
        .iter()
        .filter_map(|o| match o {
            TicketOutcome::Skipped { id, title, reason } => {
                Some((id.as_str(), title.as_str(), reason.as_str()))
            }
            TicketOutcome::Analyzed { .. } => None,
        })
        .collect();
    if skipped.is_empty() {
        return;
    }

    out.push_str(&format!(
        "<div class=\"customer-section skipped\">\n<div class=\"customer-head\"><h2>Skipped tickets</h2>\
         <div><span class=\"pill pill-open\">{}</span></div></div>\n\
         <table>\n<tr><th width=\"160\">Ticket</th><th>Title</th><th>Reason</th></tr>\n",
        skipped.len()
    ));
    for (id, title, reason) in skipped {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(id),
            escape(if title.is_empty() { "-" } else { title }),
            escape(reason)
        ));
    }
    out.push_str("</table>\n</div>\n");
}

/// CSS class for a status pill.
fn status_class(status: &str, is_completed: bool) -> &'static str {
    let s = status.to_uppercase();
    if is_completed {
        if s.contains("CUSTOMER SIDE FIX") {
            "status-customer-fix"
        } else if s.contains("INVALID") || s.contains("DUPLICATE") {
            "status-invalid"
        } else if s.contains("EXTERNAL LIMITATION") || s.contains("CAN'T FIX") {
            "status-external"
        } else {
            "status-complete"
        }
    } else if s.contains("BLOCKED") {
        "status-blocked"
    } else if s.contains("IN PROGRESS") || s.contains("PR") {
        "status-progress"
    } else if s.contains("NEEDS CUSTOMER RESPONSE") {
        "status-waiting"
    } else if s.contains("QA") || s.contains("TEST") {
        "status-qa"
    } else if s.contains("SIGNOFF") || s.contains("RELEASE") {
        "status-signoff"
    } else {
        "status-open"
    }
}

/// Only http(s) URLs become links.
fn safe_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        escape(trimmed)
    } else {
        "#".to_string()
    }
}

fn multiline(text: &str) -> String {
    escape(text.trim()).replace('\n', "<br>\n")
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}
