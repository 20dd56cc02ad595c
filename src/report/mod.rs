//! Report assembly: one self-contained HTML file per run.
//!
//! - [`html::render`] builds the document from the ticket outcomes
//! - [`write_report`] names the file after the generation time and writes it

pub mod html;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::run::TicketOutcome;

/// Everything one report is rendered from.
pub struct ReportInput<'a> {
    /// Creation window, e.g. `2024-05-01 to 2024-05-07`.
    pub range_label: String,
    pub generated_at: DateTime<Utc>,
    /// In processing order.
    pub outcomes: &'a [TicketOutcome],
}

/// `RCA_Report_<YYYYmmdd_HHMMSS>.html`
pub fn report_file_name(generated_at: DateTime<Utc>) -> String {
    format!("RCA_Report_{}.html", generated_at.format("%Y%m%d_%H%M%S"))
}

/// Renders the report into `out_dir` (created if missing) and returns its path.
pub fn write_report(out_dir: &Path, input: &ReportInput<'_>) -> std::io::Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(report_file_name(input.generated_at));
    let doc = html::render(input);
    fs::write(&path, doc.as_bytes())?;
    info!(path = %path.display(), bytes = doc.len(), "report: written");
    Ok(path)
}

/// Escapes text for HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
