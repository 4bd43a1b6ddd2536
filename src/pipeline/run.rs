// src/pipeline/run.rs

//! The poll-diff-notify cycle.
//!
//! One invocation fetches every line, compares against the previous
//! snapshot, sends at most one message and persists the new snapshot.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::{
    Config, DisruptionRecord, DisruptionSet, FailurePolicy, LineRegistry, MentionRegistry, RunInfo,
    resolve_run,
};
use crate::pipeline::compose::{Composer, Message};
use crate::pipeline::diff::{DiffResult, StateDiffer};
use crate::services::{DisruptionFetcher, FetchOutcome, Notifier};
use crate::storage::{Snapshot, SnapshotMetadata, SnapshotStore};

/// How the run decides between a full broadcast and a diff broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Full broadcast on the first run of a period, diff otherwise
    #[default]
    Auto,
    /// Always broadcast the full current status
    Full,
    /// Always diff, even on the first run of a period
    Diff,
}

/// Everything a cycle reads from.
pub struct CycleContext<'a> {
    pub config: &'a Config,
    pub registry: &'a LineRegistry,
    pub mentions: &'a MentionRegistry,
    pub fetcher: &'a DisruptionFetcher,
    pub store: &'a dyn SnapshotStore,
}

/// Current state compared against the stored snapshot, without side effects.
#[derive(Debug, Clone)]
pub struct DiffPreview {
    pub outcome: FetchOutcome,
    pub previous: Snapshot,
    pub diff: DiffResult,
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: RunInfo,
    pub first_of_period: bool,
    pub diff: DiffResult,
    /// Message handed to the notifier, if any
    pub message: Option<Message>,
    pub delivered: bool,
    pub persisted: bool,
    pub failed_lines: Vec<String>,
}

/// Whether this run opens its period.
///
/// A slot marked first always is, and so is any run with no previous
/// snapshot. Otherwise the previous snapshot decides: one from another day
/// or block means the period's earlier runs never persisted. Legacy
/// snapshots without metadata fall back to the slot flag.
pub fn is_first_of_period(run: &RunInfo, previous: &Snapshot, today: NaiveDate) -> bool {
    if run.first_run || !previous.found {
        return true;
    }
    match &previous.metadata {
        Some(metadata) => !metadata.same_period(run, today),
        None => false,
    }
}

/// Remove lines that could not be fetched from both sides so they classify
/// as nothing at all.
fn comparable_sets(
    policy: FailurePolicy,
    current: &DisruptionSet,
    previous: &DisruptionSet,
    failed_lines: &[String],
) -> (DisruptionSet, DisruptionSet) {
    match policy {
        FailurePolicy::Skip if !failed_lines.is_empty() => (
            current.without(failed_lines),
            previous.without(failed_lines),
        ),
        _ => (current.clone(), previous.clone()),
    }
}

/// Previous records of skipped lines. They are stored apart from the
/// observed set and only serve as the next run's baseline.
fn carried_records(
    policy: FailurePolicy,
    baseline: &DisruptionSet,
    failed_lines: &[String],
) -> Vec<DisruptionRecord> {
    if policy != FailurePolicy::Skip {
        return Vec::new();
    }
    failed_lines
        .iter()
        .filter_map(|id| baseline.get(id).cloned())
        .collect()
}

/// Fetch current disruptions only.
pub async fn check(ctx: &CycleContext<'_>) -> Result<FetchOutcome> {
    ctx.fetcher.fetch_all(ctx.registry).await
}

/// Fetch and diff against the stored snapshot without sending or saving.
pub async fn preview_diff(ctx: &CycleContext<'_>) -> Result<DiffPreview> {
    let outcome = ctx.fetcher.fetch_all(ctx.registry).await?;
    let previous = ctx.store.load().await;
    let (current, baseline) = comparable_sets(
        ctx.config.fetcher.on_fetch_failure,
        &outcome.set,
        &previous.baseline().in_registry_order(ctx.registry),
        &outcome.failed_lines,
    );
    let diff = StateDiffer::new().calculate(&current, &baseline);
    Ok(DiffPreview {
        outcome,
        previous,
        diff,
    })
}

/// Run one full cycle.
///
/// Fails only when every line fetch failed; in that case nothing is sent
/// and the snapshot is left alone. Delivery and save failures are logged
/// and reported.
pub async fn run_cycle(
    ctx: &CycleContext<'_>,
    notifier: &dyn Notifier,
    mode: RunMode,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    let config = ctx.config;
    let run = resolve_run(&config.schedule.slots, config.schedule.window_minutes, now);
    log::info!(
        "Run {} (block {}, slot {}, first run: {})",
        run.scheduled,
        run.block,
        run.slot,
        run.first_run
    );

    let outcome = ctx.fetcher.fetch_all(ctx.registry).await?;
    let previous = ctx.store.load().await;
    let previous_baseline = previous.baseline().in_registry_order(ctx.registry);
    let policy = config.fetcher.on_fetch_failure;

    let first_of_period = is_first_of_period(&run, &previous, now.date_naive());
    let full_broadcast = match mode {
        RunMode::Full => true,
        RunMode::Diff => false,
        RunMode::Auto => first_of_period && config.notify.full_broadcast_on_first_run,
    };

    let (current, baseline) = comparable_sets(
        policy,
        &outcome.set,
        &previous_baseline,
        &outcome.failed_lines,
    );
    let diff = StateDiffer::new().calculate(&current, &baseline);
    log::info!(
        "Diff: {} new, {} updated, {} resolved, {} unchanged",
        diff.classification.new.len(),
        diff.classification.updated.len(),
        diff.classification.resolved.len(),
        diff.classification.unchanged.len()
    );

    let composer = Composer::new(ctx.registry)
        .with_mentions(ctx.mentions)
        .with_options(config.notify.clone());
    let message = if full_broadcast {
        log::info!("Sending full status broadcast");
        Some(composer.compose_full(&current))
    } else if diff.should_notify {
        log::info!("Sending {} changes", diff.change_count());
        Some(composer.compose(&diff.classification))
    } else {
        log::info!("No changes, nothing to send");
        None
    };

    let mut delivered = false;
    if let Some(message) = &message {
        match notifier.send(message).await {
            Ok(()) => delivered = true,
            Err(e) => log::error!("Delivery via {} failed: {}", notifier.name(), e),
        }
    }

    let delivery_failed = message.is_some() && !delivered;
    let persisted = if delivery_failed && !config.notify.persist_on_delivery_failure {
        log::warn!("Keeping previous snapshot so the same changes are sent next run");
        false
    } else {
        let carried = carried_records(policy, &previous_baseline, &outcome.failed_lines);
        for record in &carried {
            log::warn!(
                "No data for {} this run; keeping its last known record as baseline only",
                record.line_id
            );
        }
        let metadata = SnapshotMetadata::for_run(&run, now).with_carried(carried);
        match ctx.store.save(&current, &metadata).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to save snapshot to {}: {}", ctx.store.location(), e);
                false
            }
        }
    };

    Ok(RunReport {
        run,
        first_of_period,
        diff,
        message,
        delivered,
        persisted,
        failed_lines: outcome.failed_lines,
    })
}
