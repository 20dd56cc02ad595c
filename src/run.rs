//! One report run: connect the sources, analyze every ticket, write the report.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ai_llm_service::LlmServiceProfiles;
use incident_sources::{
    ClickUpClient, ClickUpConfig, SlackClient, SlackConfig, ThreadRef, TicketSummary,
};
use rca_engine::{
    ChatThread, Completer, CompletionRequest, EngineConfig, SynthesisError, TicketAnalysis,
    TrackerTicket, analyze_ticket,
};

use crate::cli::Args;
use crate::report::{self, ReportInput};

/// Completion backend for this run.
pub enum RcaCompleter {
    Llm(LlmServiceProfiles),
    /// `--no-ai` or no usable LLM configuration.
    Disabled,
}

impl Completer for RcaCompleter {
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, SynthesisError>> + Send {
        async move {
            match self {
                RcaCompleter::Llm(profiles) => profiles.complete(request).await,
                RcaCompleter::Disabled => Err(SynthesisError::Disabled),
            }
        }
    }
}

/// Result of one ticket's trip through the pipeline.
#[derive(Debug, Clone)]
pub enum TicketOutcome {
    Analyzed {
        summary: TicketSummary,
        analysis: TicketAnalysis,
        has_chat: bool,
    },
    /// The tracker could not deliver the ticket.
    Skipped { id: String, title: String, reason: String },
}

/// Which tickets to process.
#[derive(Debug, Clone)]
enum TicketJob {
    Listed(TicketSummary),
    ById(String),
}

impl TicketJob {
    fn id(&self) -> &str {
        match self {
            TicketJob::Listed(s) => &s.id,
            TicketJob::ById(id) => id,
        }
    }
}

/// Shared, read-only state of the worker pool.
struct RunContext {
    clickup: ClickUpClient,
    slack: Option<SlackClient>,
    completer: RcaCompleter,
    engine: EngineConfig,
}

pub async fn run(args: Args) -> Result<()> {
    let t0 = Instant::now();
    let now = Utc::now();
    let range = args.date_range(now);

    // ---------------------------
    // Configuration + connections
    // ---------------------------
    let engine = EngineConfig::from_env().context("engine configuration")?;
    let clickup_cfg = ClickUpConfig::from_env().context("ClickUp configuration")?;
    let clickup = ClickUpClient::new(&clickup_cfg).context("ClickUp client")?;
    let me = clickup
        .current_user()
        .await
        .context("ClickUp connection test failed")?;
    info!(user = %me, "clickup: connected");

    let slack = connect_slack().await;
    let completer = build_completer(args.no_ai);

    // ---------------------------
    // Ticket selection
    // ---------------------------
    let jobs: Vec<TicketJob> = if args.tickets.is_empty() {
        let Some(folder) = clickup_cfg.folder_id.as_deref() else {
            bail!("CLICKUP_FOLDER_ID is not set and no --ticket was given");
        };
        let listed = clickup
            .list_folder_tickets(folder, &range)
            .await
            .with_context(|| format!("listing tickets in folder {folder}"))?;
        listed.into_iter().map(TicketJob::Listed).collect()
    } else {
        args.tickets.iter().cloned().map(TicketJob::ById).collect()
    };
    info!(
        tickets = jobs.len(),
        range = %range.label(),
        workers = args.workers,
        "run: tickets selected"
    );

    // ---------------------------
    // Analysis
    // ---------------------------
    let ctx = Arc::new(RunContext {
        clickup,
        slack,
        completer,
        engine,
    });
    let outcomes = process_all(ctx, jobs, usize::from(args.workers)).await;

    // ---------------------------
    // Report
    // ---------------------------
    let input = ReportInput {
        range_label: range.label(),
        generated_at: Utc::now(),
        outcomes: &outcomes,
    };
    let path = report::write_report(&args.out, &input)
        .with_context(|| format!("writing report into {}", args.out.display()))?;

    print_summary(&outcomes, &path, t0);
    Ok(())
}

/// Slack is optional: a missing token or failed auth means tracker data only.
async fn connect_slack() -> Option<SlackClient> {
    let cfg = match SlackConfig::from_env() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            warn!("slack: SLACK_BOT_TOKEN not set, chat threads are skipped");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "slack: invalid configuration, chat threads are skipped");
            return None;
        }
    };
    let client = match SlackClient::new(&cfg) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "slack: client init failed, chat threads are skipped");
            return None;
        }
    };
    match client.auth_test().await {
        Ok(id) => {
            info!(user = %id.user, team = %id.team, "slack: connected");
            Some(client)
        }
        Err(e) => {
            warn!(error = %e, "slack: auth test failed, chat threads are skipped");
            None
        }
    }
}

fn build_completer(no_ai: bool) -> RcaCompleter {
    if no_ai {
        info!("llm: disabled by --no-ai");
        return RcaCompleter::Disabled;
    }
    match LlmServiceProfiles::from_env() {
        Ok(profiles) => {
            let (fast, slow) = profiles.profiles();
            info!(fast = %fast.model, slow = %slow.model, "llm: profiles ready");
            RcaCompleter::Llm(profiles)
        }
        Err(e) => {
            warn!(error = %e, "llm: configuration failed, analyses will be unavailable");
            RcaCompleter::Disabled
        }
    }
}

/// Runs `jobs` on at most `workers` tasks; outcomes keep the job order.
async fn process_all(ctx: Arc<RunContext>, jobs: Vec<TicketJob>, workers: usize) -> Vec<TicketOutcome> {
    let total = jobs.len();
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}/{len:3} {msg}") {
        pb.set_style(style);
    }

    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        let sem = Arc::clone(&sem);
        set.spawn(async move {
            let id = job.id().to_string();
            let outcome = match sem.acquire_owned().await {
                Ok(_permit) => process_ticket(&ctx, job).await,
                Err(_) => TicketOutcome::Skipped {
                    id: id.clone(),
                    title: String::new(),
                    reason: "worker pool closed".to_string(),
                },
            };
            (index, id, outcome)
        });
    }

    let mut slots: Vec<Option<TicketOutcome>> = vec![None; total];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, id, outcome)) => {
                pb.inc(1);
                pb.set_message(id);
                slots[index] = Some(outcome);
            }
            Err(e) => {
                pb.inc(1);
                warn!(error = %e, "run: ticket task aborted");
            }
        }
    }
    pb.finish_and_clear();

    slots.into_iter().flatten().collect()
}

async fn process_ticket(ctx: &RunContext, job: TicketJob) -> TicketOutcome {
    let t0 = Instant::now();
    let id = job.id().to_string();

    let mut ticket = match ctx.clickup.fetch_ticket(&id).await {
        Ok(t) => t,
        Err(e) => {
            warn!(ticket = %id, error = %e, "run: ticket skipped");
            let title = match &job {
                TicketJob::Listed(s) => s.title.clone(),
                TicketJob::ById(_) => String::new(),
            };
            return TicketOutcome::Skipped {
                id,
                title,
                reason: e.to_string(),
            };
        }
    };

    let summary = match job {
        TicketJob::Listed(s) => s,
        TicketJob::ById(_) => TicketSummary::from_ticket(&ticket, Utc::now()),
    };
    if ticket.customer.is_none() {
        ticket.customer = Some(summary.customer.clone());
    }

    let chat = fetch_chat(ctx, &ticket).await;
    let analysis = analyze_ticket(&ticket, chat.as_ref(), &ctx.completer, &ctx.engine).await;
    debug!(
        ticket = %id,
        chat = chat.is_some(),
        "run: ticket done ({} ms)",
        t0.elapsed().as_millis()
    );

    TicketOutcome::Analyzed {
        has_chat: analysis.bundle.has_chat(),
        summary,
        analysis,
    }
}

/// Chat data is best effort; any failure means "no chat".
async fn fetch_chat(ctx: &RunContext, ticket: &TrackerTicket) -> Option<ChatThread> {
    let slack = ctx.slack.as_ref()?;
    let url = ticket.chat_thread_url.as_deref()?;
    let Some(thread) = ThreadRef::find_in(url) else {
        debug!(ticket = %ticket.id, url = %url, "run: chat link not recognized");
        return None;
    };
    match slack.fetch_thread(&thread).await {
        Ok(found) => found,
        Err(e) => {
            warn!(ticket = %ticket.id, error = %e, "run: chat thread unavailable");
            None
        }
    }
}

fn print_summary(outcomes: &[TicketOutcome], path: &std::path::Path, t0: Instant) {
    let analyzed = outcomes
        .iter()
        .filter(|o| matches!(o, TicketOutcome::Analyzed { .. }))
        .count();
    let unavailable = outcomes
        .iter()
        .filter(|o| {
            matches!(o, TicketOutcome::Analyzed { analysis, .. } if analysis.result.analysis_unavailable())
        })
        .count();
    let skipped = outcomes.len() - analyzed;

    println!();
    println!("{}", "RCA report ready".green().bold());
    println!("  tickets:     {}", outcomes.len());
    println!("  analyzed:    {}", analyzed.to_string().green());
    if unavailable > 0 {
        println!("  no analysis: {}", unavailable.to_string().yellow());
    }
    if skipped > 0 {
        println!("  skipped:     {}", skipped.to_string().red());
    }
    println!("  file:        {}", path.display().to_string().cyan());
    println!("  took:        {:.1}s", t0.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rca_engine::Stage;

    #[tokio::test]
    async fn disabled_completer_refuses() {
        let req = CompletionRequest {
            stage: Stage::Single,
            system: "sys",
            prompt: "prompt",
        };
        let err = RcaCompleter::Disabled.complete(req).await.unwrap_err();
        assert_eq!(err, SynthesisError::Disabled);
    }

    #[tokio::test]
    async fn disabled_completer_yields_unavailable_analysis() {
        let ticket = TrackerTicket {
            id: "t1".into(),
            title: "Checkout broken".into(),
            status: "open".into(),
            created_at: Some("2024-05-01T10:00:00Z".into()),
            comments: vec![rca_engine::sources::TrackerComment {
                id: "c1".into(),
                author: Some("ann".into()),
                timestamp: Some("2024-05-01T10:05:00Z".into()),
                text: Some(
                    "Checkout returns 500 for every EU customer since the deploy this morning."
                        .into(),
                ),
                attachments: vec![],
            }],
            ..Default::default()
        };
        let analysis = analyze_ticket(
            &ticket,
            None,
            &RcaCompleter::Disabled,
            &EngineConfig::default(),
        )
        .await;
        assert!(analysis.result.analysis_unavailable());
    }

    #[test]
    fn job_ids() {
        assert_eq!(TicketJob::ById("x".into()).id(), "x");
    }
}
