use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use digest_agent::{
    changed_message, ChatCompletionsGenerator, CycleOutcome, DigestConfig, LogTransport,
    NotifyPolicy, Orchestrator, TelegramTransport,
};
use report_pipeline::{
    normalize_equal, ChangeDetection, MessageTransport, ReportDiffer, ReportStore,
    SimilarityComparer,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (environment variables override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the snapshot and history (overrides DIGEST_STATE_DIR)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// always_notify, notify_on_change or suppress_empty_sections (overrides DIGEST_NOTIFY_POLICY)
    #[arg(long)]
    policy: Option<NotifyPolicy>,

    /// sections or added_lines (overrides DIGEST_CHANGE_DETECTION)
    #[arg(long)]
    detection: Option<ChangeDetection>,

    /// Log chunks instead of sending them to Telegram. State is still updated,
    /// pair with --state-dir for a scratch run.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one digest cycle (default)
    Run,
    /// Print the most recent history entries
    History {
        #[arg(long, default_value_t = 1)]
        last: usize,
    },
    /// Print the message a report would produce against the current snapshot
    Diff {
        #[arg(long)]
        new: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = DigestConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.state_dir {
        config.state_dir = dir;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(detection) = args.detection {
        config.detection = detection;
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, args.dry_run).await,
        Command::History { last } => {
            print_history(&config, last)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff { new } => {
            print_diff(&config, &new)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: &DigestConfig, dry_run: bool) -> Result<ExitCode> {
    if dry_run {
        config.validate_dry_run()?;
    } else {
        config.validate()?;
    }

    let generator = ChatCompletionsGenerator::new(config.generator.clone())
        .context("Failed to build LLM client")?;
    let transport: Box<dyn MessageTransport> = if dry_run {
        Box::new(LogTransport)
    } else {
        Box::new(
            TelegramTransport::new(config.telegram.clone())
                .context("Failed to build Telegram client")?,
        )
    };

    info!(
        model = %config.generator.model,
        state_dir = %config.state_dir.display(),
        policy = %config.policy,
        detection = %config.detection,
        dry_run,
        "Digest agent starting"
    );

    let orchestrator = Orchestrator::from_config(config, generator, transport)?;
    match orchestrator.run_cycle().await {
        Ok(outcome) => {
            if let Some(delivery) = outcome.delivery() {
                if !delivery.is_success() {
                    warn!(
                        failed = delivery.failed_count(),
                        chunks = delivery.chunks.len(),
                        "Some chunks were not delivered"
                    );
                }
            }
            match &outcome {
                CycleOutcome::EmptyOutput => warn!("Generator returned no text, nothing done"),
                other => info!(outcome = other.label(), "Digest cycle finished"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Digest cycle failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_history(config: &DigestConfig, last: usize) -> Result<()> {
    let store = ReportStore::in_dir(&config.state_dir);
    let entries = store.history()?;
    let skip = entries.len().saturating_sub(last);
    if entries.is_empty() {
        println!("No history in {}", store.history_path().display());
    }
    for entry in &entries[skip..] {
        println!("=== {} ===\n{}\n", entry.recorded_at.to_rfc3339(), entry.text);
    }
    Ok(())
}

fn print_diff(config: &DigestConfig, new: &std::path::Path) -> Result<()> {
    config.validate_tunables()?;
    let report = std::fs::read_to_string(new)
        .with_context(|| format!("Failed to read {}", new.display()))?;
    let previous = ReportStore::in_dir(&config.state_dir).load()?;

    if previous.trim().is_empty() {
        println!("{report}");
        return Ok(());
    }
    if normalize_equal(&report, &previous) {
        println!("Report unchanged since the last snapshot.");
        return Ok(());
    }

    let differ = ReportDiffer::new(
        SimilarityComparer::new(config.similarity_threshold)?,
        config.marker_anchor,
    );
    match changed_message(&differ, config.detection, config.policy, &report, &previous) {
        Some(message) => println!("{message}"),
        None => println!("Report changed but there is nothing to send."),
    }
    Ok(())
}
