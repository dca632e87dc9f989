//! Workflow plan step.
//!
//! Selects the whole eligible work list and writes it as batches so external
//! runners can shard a run.
use super::discover::discover_and_save;
use super::MigrateContext;
use crate::cli::PlanArgs;
use crate::schedule::{build_plan, bucket_work, write_plan, BatchPlan, PlanStats, SelectOptions};
use crate::state::MigrationState;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Build a plan from a snapshot without touching disk.
pub fn plan_for_state(
    state: &MigrationState,
    options: &SelectOptions,
    batch_size: usize,
    max_batches_per_run: usize,
    max_parallel: usize,
    now: DateTime<Utc>,
) -> Result<BatchPlan> {
    let buckets = bucket_work(state, options, now);
    let stats = PlanStats {
        counts: state.counts(),
        retry_selected: buckets.retry.len(),
        pending_selected: buckets.pending.len(),
        resync_selected: buckets.resync.len(),
        max_parallel,
    };
    let selected = buckets.into_ordered(options.max_count);
    build_plan(selected, stats, batch_size, max_batches_per_run, now)
}

pub(crate) fn run_plan(args: PlanArgs) -> Result<()> {
    let ctx = MigrateContext::load(&args.common)?;
    let mut store = ctx.open_store();
    if args.discover {
        discover_and_save(&ctx, &mut store)?;
    }
    let options = ctx.select_options(&args.select, usize::MAX);
    let plan = plan_for_state(
        store.state(),
        &options,
        args.batch_size.unwrap_or(ctx.config.batch_size),
        args.max_batches.unwrap_or(ctx.config.max_batches_per_run),
        ctx.config.max_parallel,
        Utc::now(),
    )?;
    write_plan(&args.out, &plan)?;
    tracing::info!(
        repos = plan.total_repos,
        batches = plan.total_batches,
        batches_to_run = plan.batches_to_run,
        "plan written"
    );
    println!(
        "Wrote plan to {}: {} repositories in {} batches ({} to run; {} retry, {} pending, {} resync)",
        args.out.display(),
        plan.total_repos,
        plan.total_batches,
        plan.batches_to_run,
        plan.stats.retry_selected,
        plan.stats.pending_selected,
        plan.stats.resync_selected
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{parse_timestamp, ErrorType, PhaseProgress, RepoState, RepoStatus};

    #[test]
    fn plan_counts_buckets_before_truncation() {
        let mut state = MigrationState::new("src", "dst");
        for name in ["a", "b", "c", "d", "e"] {
            state.repos.insert(name, RepoState::default());
        }
        state.repos.insert(
            "f",
            RepoState {
                status: RepoStatus::Failed,
                error_type: Some(ErrorType::Transient),
                ..RepoState::default()
            },
        );
        state.repos.insert(
            "g",
            RepoState {
                status: RepoStatus::Completed,
                phases: PhaseProgress::Synced,
                last_synced_at: Some(parse_timestamp("2024-01-01").unwrap()),
                remote_last_modified: Some(parse_timestamp("2024-02-01").unwrap()),
                ..RepoState::default()
            },
        );
        let options = SelectOptions {
            max_count: usize::MAX,
            include_sync: true,
            inactivity_cutoff_days: 0,
            max_attempts: None,
        };
        let now = parse_timestamp("2024-03-01").unwrap();
        let plan = plan_for_state(&state, &options, 3, 2, 4, now).expect("plan");

        assert_eq!(plan.total_repos, 7);
        assert_eq!(plan.total_batches, 3);
        assert_eq!(plan.batches_to_run, 2);
        assert_eq!(plan.batches[0].repos, vec!["f", "a", "b"]);
        assert_eq!(plan.batches[1].repos, vec!["c", "d", "e"]);
        assert_eq!(plan.stats.retry_selected, 1);
        assert_eq!(plan.stats.pending_selected, 5);
        assert_eq!(plan.stats.resync_selected, 1);
        assert_eq!(plan.stats.counts.completed, 1);
        assert_eq!(plan.stats.counts.failed_retryable, 1);
        assert_eq!(plan.stats.max_parallel, 4);
    }
}
