mod cli;
mod report;
mod run;

use anyhow::anyhow;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai_llm_service::telemetry::{env_filter_with_level, layer_for};

/// Crate targets whose events reach the console.
const LOG_TARGETS: &[&str] = &["rca_backend", "rca_engine", "incident_sources", "ai_llm_service"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real env vars win.
    dotenvy::dotenv().ok();

    let args = cli::Args::parse();
    args.validate().map_err(|e| anyhow!(e))?;

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(env_filter_with_level("info", LOG_TARGETS, level))
        .with(layer_for(LOG_TARGETS))
        .try_init()?;

    run::run(args).await
}
