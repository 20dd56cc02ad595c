//! Tracing layer shared by the workspace binaries.
//!
//! The layer renders only events whose target starts with one of the given
//! crate prefixes, so third-party noise (hyper, reqwest) stays out of the
//! console unless `RUST_LOG` asks for it.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Crate target prefix of this library.
pub const TARGET_PREFIX: &str = "ai_llm_service";

/// RFC3339 UTC timer implemented via `chrono`.
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// Builds a formatting layer that renders only events from `prefixes`.
///
/// - RFC3339 UTC timestamps
/// - Compact single-line format with target
/// - ANSI colors only when stdout is a terminal
pub fn layer_for<S>(prefixes: &'static [&'static str]) -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stdout().is_terminal();
    let only_ours =
        filter::filter_fn(move |meta| prefixes.iter().any(|p| meta.target().starts_with(p)));

    fmt::layer()
        .event_format(
            fmt::format()
                .compact()
                .with_timer(ChronoRfc3339Utc)
                .with_level(true)
                .with_target(true),
        )
        .with_ansi(use_ansi)
        .with_filter(only_ours)
}

/// Builds a level directive for one crate target, e.g. `rca_engine=debug`.
pub fn level_directive(target: &str, level: Level) -> Result<Directive, ParseError> {
    format!("{target}={}", level.as_str().to_lowercase()).parse()
}

/// Creates an EnvFilter from `RUST_LOG` or `default`, then raises the listed
/// crate targets to `level`.
pub fn env_filter_with_level(default: &str, targets: &[&str], level: Level) -> EnvFilter {
    let mut base =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    for target in targets {
        if let Ok(d) = level_directive(target, level) {
            base = base.add_directive(d);
        }
    }
    base
}
