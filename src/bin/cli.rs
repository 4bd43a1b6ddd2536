//! tubewatch CLI
//!
//! One invocation runs one cycle; scheduling is left to cron or a workflow
//! runner.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tubewatch::{
    config::{self, Settings},
    error::Result,
    pipeline::{self, CycleContext, RunMode},
    services::{
        ConsoleNotifier, DisruptionFetcher, Notifier, SlackCredentials, SlackNotifier,
        build_sources,
    },
    storage::{LocalSnapshotStore, SnapshotStore},
    utils::http,
};

/// tubewatch - Transit disruption watcher
#[derive(Parser, Debug)]
#[command(
    name = "tubewatch",
    version,
    about = "Poll line status, diff against the last run, notify on change"
)]
struct Cli {
    /// Path to storage directory containing config and state files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, diff, notify and save the snapshot
    Run {
        /// Print the message instead of posting it (no credentials needed)
        #[arg(long)]
        dry_run: bool,

        /// Broadcast mode
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,
    },

    /// Fetch and show current disruptions only
    Check,

    /// Fetch and show the diff against the saved snapshot without saving
    Diff,

    /// Validate configuration files
    Validate,

    /// Show current snapshot info
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Full,
    Diff,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => RunMode::Auto,
            ModeArg::Full => RunMode::Full,
            ModeArg::Diff => RunMode::Diff,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_fetcher(settings: &Settings, client: &reqwest::Client) -> Result<DisruptionFetcher> {
    let sources = build_sources(&settings.config, client)?;
    Ok(DisruptionFetcher::new(sources, settings.config.fetcher.clone()))
}

fn context<'a>(
    settings: &'a Settings,
    fetcher: &'a DisruptionFetcher,
    store: &'a LocalSnapshotStore,
) -> CycleContext<'a> {
    CycleContext {
        config: &settings.config,
        registry: &settings.registry,
        mentions: &settings.mentions,
        fetcher,
        store,
    }
}

async fn run(settings: &Settings, dry_run: bool, mode: RunMode) -> Result<()> {
    let client = http::create_async_client(&settings.config.fetcher)?;

    // Credentials are checked before anything is fetched or written.
    let notifier: Box<dyn Notifier> = if dry_run {
        Box::new(ConsoleNotifier)
    } else {
        Box::new(SlackNotifier::new(client.clone(), SlackCredentials::from_env()?))
    };

    let fetcher = build_fetcher(settings, &client)?;
    let store = LocalSnapshotStore::new(settings.snapshot_path());
    let ctx = context(settings, &fetcher, &store);

    let report = pipeline::run_cycle(&ctx, notifier.as_ref(), mode, Utc::now()).await?;

    if !report.failed_lines.is_empty() {
        log::warn!("Lines without data this run: {}", report.failed_lines.join(", "));
    }
    match &report.message {
        Some(message) if report.delivered => {
            log::info!("Sent '{}' via {}", message.title, notifier.name())
        }
        Some(message) => log::warn!("'{}' was not delivered", message.title),
        None => log::info!("Nothing sent"),
    }
    if report.persisted {
        log::info!("Snapshot saved to {}", store.location());
    }
    Ok(())
}

async fn check(settings: &Settings) -> Result<()> {
    let client = http::create_async_client(&settings.config.fetcher)?;
    let fetcher = build_fetcher(settings, &client)?;
    let store = LocalSnapshotStore::new(settings.snapshot_path());

    let outcome = pipeline::check(&context(settings, &fetcher, &store)).await?;
    if outcome.set.is_empty() {
        log::info!("Good service on all {} lines", outcome.line_total);
    }
    for record in outcome.set.iter() {
        log::info!("{}: {}", record.line_name, record.details);
    }
    Ok(())
}

async fn diff(settings: &Settings) -> Result<()> {
    let client = http::create_async_client(&settings.config.fetcher)?;
    let fetcher = build_fetcher(settings, &client)?;
    let store = LocalSnapshotStore::new(settings.snapshot_path());

    let preview = pipeline::preview_diff(&context(settings, &fetcher, &store)).await?;
    let c = &preview.diff.classification;
    for (label, records) in [
        ("new", &c.new),
        ("updated", &c.updated),
        ("resolved", &c.resolved),
        ("unchanged", &c.unchanged),
    ] {
        for record in records {
            log::info!("[{label}] {}: {}", record.line_name, record.details);
        }
    }
    log::info!(
        "Would notify: {} ({} changes)",
        preview.diff.should_notify,
        preview.diff.change_count()
    );
    Ok(())
}

fn validate(storage_dir: &Path) -> Result<()> {
    log::info!("Validating configuration...");

    let config_path = storage_dir.join(config::CONFIG_FILE);
    if !config_path.exists() {
        log::warn!("{} not found, checking defaults", config_path.display());
    }

    let settings = match config::load_all(storage_dir) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Validation failed: {}", e);
            return Err(e);
        }
    };
    log::info!("✓ Config OK");
    log::info!("✓ {} lines registered", settings.registry.len());
    if settings.mentions.is_empty() {
        log::info!("No mentions configured");
    }

    log::info!("All validations passed!");
    Ok(())
}

async fn info(settings: &Settings) -> Result<()> {
    let store = LocalSnapshotStore::new(settings.snapshot_path());
    log::info!("Storage directory: {}", settings.storage_dir.display());

    if !store.path().exists() {
        log::info!("No snapshot found yet.");
        return Ok(());
    }

    let snapshot = store.load().await;
    match &snapshot.metadata {
        Some(metadata) => {
            log::info!(
                "Captured: {} ({} block, slot {})",
                metadata.date,
                metadata.block,
                metadata.slot
            );
            if let Some(at) = metadata.captured_at {
                log::info!("Captured at: {}", at.to_rfc3339());
            }
            if !metadata.carried.is_empty() {
                log::info!("Carried without fresh data: {}", metadata.carried.len());
            }
        }
        None => log::info!("Snapshot has no metadata (legacy format)"),
    }
    log::info!("Disruptions: {}", snapshot.disruptions.len());
    log::info!("Fingerprint: {}", snapshot.disruptions.fingerprint());
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Validate = cli.command {
        return validate(&cli.storage_dir);
    }

    let settings = config::load_all(&cli.storage_dir)?;
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        Command::Run { dry_run, mode } => run(&settings, dry_run, mode.into()).await,
        Command::Check => check(&settings).await,
        Command::Diff => diff(&settings).await,
        Command::Info => info(&settings).await,
        Command::Validate => Ok(()),
    }
}
