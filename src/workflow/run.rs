//! Workflow run step.
//!
//! Picks the work list (selector, explicit names, or one plan batch) and
//! feeds it through the phase runner one repository at a time.
use super::discover::discover_and_save;
use super::MigrateContext;
use crate::cli::RunArgs;
use crate::remote::{ApiMigrator, ContentSyncer, MigrateParams};
use crate::runner::{PhaseRunner, RetryPolicy, RunOutcome};
use crate::schedule::{load_plan, select_work};
use crate::state::{read_state, RepoStatus, StateStore};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Totals for one `run` invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub processed: usize,
    pub completed: usize,
    pub resynced: usize,
    pub failed: usize,
    pub outcomes: Vec<RunOutcome>,
}

impl RunSummary {
    /// Whether every processed repository ended successfully.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, outcome: RunOutcome) {
        self.processed += 1;
        if !outcome.succeeded() {
            self.failed += 1;
        } else if outcome.resync {
            self.resynced += 1;
        } else {
            self.completed += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Run `names` in order against the given collaborators.
///
/// Every transition is saved before the next repository starts, so an
/// interrupted run resumes from the last checkpoint.
pub fn process_repos(
    store: &mut StateStore,
    names: &[String],
    migrator: &dyn ApiMigrator,
    syncer: &dyn ContentSyncer,
    params: MigrateParams,
    retry: RetryPolicy,
) -> Result<RunSummary> {
    let mut runner = PhaseRunner::new(store, migrator, syncer, params, retry);
    let mut summary = RunSummary::default();
    for (idx, name) in names.iter().enumerate() {
        let start = Instant::now();
        let outcome = runner.run(name)?;
        tracing::info!(
            repo = %name,
            position = idx + 1,
            total = names.len(),
            status = %outcome.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "repository processed"
        );
        summary.record(outcome);
    }
    Ok(summary)
}

pub(crate) fn run_run(args: RunArgs) -> Result<RunSummary> {
    let ctx = MigrateContext::load(&args.common)?;
    let mut store = ctx.open_store();

    let names = if let Some(plan_path) = &args.plan {
        let batch_number = args
            .batch
            .ok_or_else(|| anyhow!("--batch is required with --plan"))?;
        let canonical_path = ctx.canonical_state_path();
        if same_location(store.path(), &canonical_path) {
            return Err(anyhow!(
                "batch runs write a partial state file; pass --state other than {}",
                canonical_path.display()
            ));
        }
        let plan = load_plan(plan_path)?;
        let batch = plan.batch(batch_number).ok_or_else(|| {
            anyhow!(
                "plan {} has no batch {} ({} batches to run)",
                plan_path.display(),
                batch_number,
                plan.batches_to_run
            )
        })?;
        seed_from_canonical(&ctx, &mut store, &batch.repos);
        batch.repos.clone()
    } else if !args.repos.is_empty() {
        args.repos.clone()
    } else {
        if !args.skip_discovery {
            if let Err(err) = discover_and_save(&ctx, &mut store) {
                if store.state().repos.is_empty() {
                    return Err(err);
                }
                tracing::warn!(
                    error = %format!("{err:#}"),
                    "discovery failed; selecting from the existing snapshot"
                );
            }
        }
        let default_limit = ctx
            .config
            .batch_size
            .saturating_mul(ctx.config.max_batches_per_run);
        let options = ctx.select_options(&args.select, default_limit);
        select_work(store.state(), &options, Utc::now())
    };

    if names.is_empty() {
        println!("Nothing to do.");
        return Ok(RunSummary::default());
    }
    tracing::info!(repos = names.len(), state = %store.path().display(), "run started");

    let syncer = ctx.git_mirror()?;
    let migrator = ctx.target_api();
    let summary = process_repos(
        &mut store,
        &names,
        &migrator,
        &syncer,
        ctx.migrate_params(),
        ctx.config.retry_policy(),
    )?;
    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        remaining = remaining_work(&store),
        "run finished"
    );

    for outcome in summary.outcomes.iter().filter(|outcome| !outcome.succeeded()) {
        println!(
            "FAILED {} [{}]: {}",
            outcome.repo,
            outcome
                .error_type
                .map(|error_type| error_type.as_str())
                .unwrap_or("unknown"),
            outcome.error.as_deref().unwrap_or_default()
        );
    }
    println!(
        "Processed {} repositories: {} completed, {} resynced, {} failed",
        summary.processed, summary.completed, summary.resynced, summary.failed
    );
    Ok(summary)
}

/// Copy canonical records into a shard's fresh state file.
///
/// A shard run with `--state` starts from its own partial snapshot; seeding
/// it keeps phase flags and attempt counts from the canonical state so the
/// shard resumes instead of starting over.
fn seed_from_canonical(ctx: &MigrateContext, store: &mut StateStore, names: &[String]) {
    let canonical_path = ctx.canonical_state_path();
    if same_location(&canonical_path, store.path()) || !canonical_path.is_file() {
        return;
    }
    let canonical = match read_state(&canonical_path) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(
                path = %canonical_path.display(),
                error = %format!("{err:#}"),
                "canonical state unreadable; shard starts without it"
            );
            return;
        }
    };
    let mut seeded = 0usize;
    for name in names {
        if store.get(name).is_some() {
            continue;
        }
        if let Some(record) = canonical.get(name) {
            store.state_mut().repos.insert(name, record.clone());
            seeded += 1;
        }
    }
    if seeded > 0 {
        tracing::debug!(seeded, "seeded shard state from canonical snapshot");
    }
}

/// Whether two paths name the same file, resolving their directories.
///
/// The file itself may not exist yet (a fresh partial state).
fn same_location(left: &Path, right: &Path) -> bool {
    fn resolve(path: &Path) -> Option<PathBuf> {
        let parent = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Some(fs::canonicalize(parent).ok()?.join(path.file_name()?))
    }
    match (resolve(left), resolve(right)) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}

/// Records that have not reached a terminal status yet.
pub fn remaining_work(store: &StateStore) -> usize {
    store
        .state()
        .repos
        .iter()
        .filter(|(_, repo)| matches!(repo.status, RepoStatus::Pending | RepoStatus::InProgress))
        .count()
}
