//! HackJudge - command-line front end for the hackathon judge
//!
//! The `hackjudge` command submits a team's evidence and follows the
//! evaluator agents live until the verdict arrives.
//!
//! ## Commands
//!
//! - `submit`: Submit evidence and stream agent progress
//! - `result`: Fetch the result of a job by id
//! - `health`: Check that the backend is up
//! - `results`: Browse verdicts saved by the backend

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hackjudge_client::{
    classify_result_body, Attachment, ClientConfig, ConcurrencyPolicy, Evidence, FallbackOutcome,
    FallbackPolicy, HttpJudgeApi, JobEvent, JobId, JudgeApi, JudgingResult, LoggedEvent, Phase,
    Recovery, SessionHandle, Snapshot,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "hackjudge")]
#[command(author = "HackJudge Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent hackathon judging client", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON results
    #[arg(long, global = true)]
    json: bool,

    /// Backend base URL
    #[arg(long, global = true, env = "HACKJUDGE_SERVER_URL")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit evidence for judging and follow the agents live
    Submit(SubmitArgs),

    /// Fetch the result of a judging job
    Result {
        /// Job id returned by `submit`
        job_id: String,
    },

    /// Check backend health
    Health,

    /// Browse saved verdicts
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },
}

#[derive(Args)]
struct SubmitArgs {
    /// Team name
    #[arg(short, long)]
    team: String,

    /// GitHub repository URL
    #[arg(short, long)]
    github: String,

    /// Pitch transcript text
    #[arg(long, conflicts_with = "transcript_file")]
    transcript: Option<String>,

    /// Read the pitch transcript from a file
    #[arg(long)]
    transcript_file: Option<PathBuf>,

    /// Pitch deck (.pptx)
    #[arg(long)]
    pptx: Option<PathBuf>,

    /// Demo video
    #[arg(long)]
    video: Option<PathBuf>,

    /// Report at most one active agent at a time
    #[arg(long)]
    sequential: bool,

    /// Result pulls after the stream drops
    #[arg(long)]
    fallback_attempts: Option<u32>,

    /// Pause between result pulls, in milliseconds
    #[arg(long)]
    fallback_interval_ms: Option<u64>,

    /// Write the verdict JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ResultsAction {
    /// List saved verdicts, newest first
    List,
    /// Show a saved verdict
    Show {
        /// File name as printed by `results list`
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    hackjudge_client::init_tracing(cli.json, level);

    let mut config = ClientConfig::from_env();
    if let Some(server) = &cli.server {
        config = config.with_server_url(server);
    }
    debug!(server = %config.server_url, "using judging backend");

    match cli.command {
        Commands::Submit(args) => cmd_submit(config, args, cli.json).await,
        Commands::Result { job_id } => cmd_result(&config, &job_id, cli.json).await,
        Commands::Health => cmd_health(&config).await,
        Commands::Results { action } => match action {
            ResultsAction::List => cmd_results_list(&config).await,
            ResultsAction::Show { file } => cmd_results_show(&config, &file, cli.json).await,
        },
    }
}

// ========== Submit ==========

/// Submit evidence and print agent activity until the job settles
async fn cmd_submit(config: ClientConfig, args: SubmitArgs, json: bool) -> Result<()> {
    let config = apply_submit_overrides(config, &args);
    let evidence = build_evidence(&args).await?;

    let session =
        SessionHandle::connect(&config).context("Failed to create HackJudge client")?;
    let mut updates = session.subscribe();
    session
        .submit(evidence)
        .context("Judging session stopped before submit")?;

    println!("Submitting evidence for {}...", args.team);

    let mut printed = 0usize;
    let mut announced = false;
    let snapshot = loop {
        let snapshot = updates.borrow_and_update().clone();

        if !announced {
            if let Some(job_id) = &snapshot.job_id {
                println!("Job {} started ({} agents)", job_id, snapshot.registry.len());
                announced = true;
            }
        }
        for entry in snapshot.activity_log.iter().skip(printed) {
            println!("{}", describe_event(entry, &snapshot));
        }
        printed = snapshot.activity_log.len();

        if snapshot.is_terminal() {
            break snapshot;
        }
        if let Recovery::Inconclusive { reason } = &snapshot.recovery {
            let job_id = snapshot
                .job_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default();
            session.shutdown().await;
            bail!(
                "Lost the live stream and no verdict is available yet ({reason}). \
                 Check later with `hackjudge result {job_id}`"
            );
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    bail!("Judging session stopped unexpectedly");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.reset().ok();
                session.shutdown().await;
                println!("Cancelled.");
                return Ok(());
            }
        }
    };
    session.shutdown().await;

    match snapshot.phase {
        Phase::Verdict => {
            let result = snapshot
                .result
                .context("Verdict phase reached without a result")?;
            if let Some(path) = &args.output {
                write_result(path, &result)?;
                println!("Verdict saved to {}", path.display());
            }
            print_result(&result, json)
        }
        _ => bail!(
            "Judging failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn apply_submit_overrides(config: ClientConfig, args: &SubmitArgs) -> ClientConfig {
    let mut fallback: FallbackPolicy = config.fallback.clone();
    if let Some(attempts) = args.fallback_attempts {
        fallback = fallback.with_attempts(attempts);
    }
    if let Some(interval_ms) = args.fallback_interval_ms {
        fallback = fallback.with_interval(Duration::from_millis(interval_ms));
    }

    let config = config.with_fallback(fallback);
    if args.sequential {
        config.with_concurrency(ConcurrencyPolicy::Sequential)
    } else {
        config
    }
}

async fn build_evidence(args: &SubmitArgs) -> Result<Evidence> {
    let mut evidence = Evidence::new(args.team.as_str(), args.github.as_str());

    if let Some(text) = &args.transcript {
        evidence = evidence.with_transcript(text.as_str());
    } else if let Some(path) = &args.transcript_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        evidence = evidence.with_transcript(text);
    }
    if let Some(path) = &args.pptx {
        evidence = evidence.with_pitch_deck(load_attachment(path).await?);
    }
    if let Some(path) = &args.video {
        evidence = evidence.with_demo_video(load_attachment(path).await?);
    }

    evidence.validate()?;
    Ok(evidence)
}

async fn load_attachment(path: &Path) -> Result<Attachment> {
    Attachment::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// One line of the activity feed
fn describe_event(entry: &LoggedEvent, snapshot: &Snapshot) -> String {
    let line = match &entry.event {
        JobEvent::AgentStarted { agent } => format!("[{agent}] started"),
        JobEvent::AgentStep { agent, content } => {
            format!("[{agent}] {}", truncate(content, 120))
        }
        JobEvent::AgentComplete { agent, summary } => {
            // Count as of this entry, not as of the latest snapshot.
            let done: BTreeSet<&str> = snapshot
                .activity_log
                .iter()
                .take(entry.seq as usize)
                .filter_map(|logged| match &logged.event {
                    JobEvent::AgentComplete { agent, .. } if snapshot.registry.contains(agent) => {
                        Some(agent.as_str())
                    }
                    _ => None,
                })
                .collect();
            format!(
                "[{agent}] done: {} ({}/{})",
                truncate(summary, 120),
                done.len(),
                snapshot.registry.len()
            )
        }
        JobEvent::Verdict { .. } => "Verdict received".to_string(),
        JobEvent::Error { message } => format!("Error: {message}"),
    };

    match &entry.server_timestamp {
        Some(ts) => format!("{ts}  {line}"),
        None => format!("{}  {line}", entry.received_at.format("%H:%M:%S")),
    }
}

// ========== Results ==========

/// Fetch a job result directly
async fn cmd_result(config: &ClientConfig, job_id: &str, json: bool) -> Result<()> {
    let api = HttpJudgeApi::new(config).context("Failed to create HackJudge client")?;
    let body = api
        .fetch_result(&JobId::new(job_id))
        .await
        .with_context(|| format!("Failed to fetch result for job {job_id}"))?;

    match classify_result_body(body) {
        FallbackOutcome::Completed(result) => print_result(&result, json),
        _ => {
            println!("Job {job_id} is still running.");
            Ok(())
        }
    }
}

async fn cmd_health(config: &ClientConfig) -> Result<()> {
    let api = HttpJudgeApi::new(config).context("Failed to create HackJudge client")?;
    let health = api
        .health()
        .await
        .with_context(|| format!("Backend at {} is unreachable", api.base_url()))?;

    println!("Server:  {}", api.base_url());
    println!("Status:  {}", health.status);
    if !health.service.is_empty() {
        println!("Service: {} {}", health.service, health.version);
    }
    if !health.is_ok() {
        bail!("Backend reported status {}", health.status);
    }
    Ok(())
}

async fn cmd_results_list(config: &ClientConfig) -> Result<()> {
    let api = HttpJudgeApi::new(config).context("Failed to create HackJudge client")?;
    let results = api
        .list_results()
        .await
        .context("Failed to list saved results")?;

    if results.is_empty() {
        println!("No saved results.");
    }
    for file in results {
        println!("{file}");
    }
    Ok(())
}

async fn cmd_results_show(config: &ClientConfig, file: &str, json: bool) -> Result<()> {
    let api = HttpJudgeApi::new(config).context("Failed to create HackJudge client")?;
    let body = api
        .saved_result(file)
        .await
        .with_context(|| format!("Failed to load saved result {file}"))?;
    print_result(&JudgingResult::new(body), json)
}

fn print_result(result: &JudgingResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result.as_value())?);
    } else {
        println!("{}", render_report(result)?);
    }
    Ok(())
}

fn write_result(path: &Path, result: &JudgingResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result.as_value())?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn render_report(result: &JudgingResult) -> Result<String> {
    let report = match result.report() {
        Ok(report) => report,
        // Not a full report; show what the backend sent.
        Err(_) => return Ok(serde_json::to_string_pretty(result.as_value())?),
    };

    let mut out = String::new();
    out.push_str(&format!("Verdict: {}\n", report.team_name));
    out.push_str("========\n");
    for (label, value) in report.scores.dimensions() {
        out.push_str(&format!("{:<14}{:>5.1}\n", label, value));
    }

    if !report.key_strengths.is_empty() {
        out.push_str("\nStrengths:\n");
        for s in &report.key_strengths {
            out.push_str(&format!("  + {}\n", s));
        }
    }
    if !report.key_concerns.is_empty() {
        out.push_str("\nConcerns:\n");
        for c in &report.key_concerns {
            out.push_str(&format!("  - {}\n", c));
        }
    }

    let questions = report.prioritized_questions();
    if !questions.is_empty() {
        out.push_str("\nQuestions:\n");
        for q in questions {
            out.push_str(&format!(
                "  [{:?}] {} ({})\n",
                q.priority, q.question, q.source_evidence
            ));
        }
    }

    Ok(out.trim_end().to_string())
}

/// Truncate a string for display
fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
