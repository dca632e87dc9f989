//! Workflow status and failure listing.
//!
//! Both commands are read-only: they inspect the snapshot without renaming,
//! repairing, or saving it.
use super::MigrateContext;
use crate::cli::{FailedArgs, StatusArgs};
use crate::schedule::resync_candidate;
use crate::state::{
    format_timestamp, opt_timestamp, ErrorType, MigrationState, RepoStatus, StatusCounts,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot summary printed by `rmig status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub source_org: String,
    pub target_org: String,
    pub state_path: String,
    #[serde(with = "opt_timestamp")]
    pub last_discovery: Option<DateTime<Utc>>,
    pub total_repos: usize,
    pub tracked: usize,
    pub counts: StatusCounts,
    pub resync_candidates: usize,
    pub next_action: String,
}

/// One failed repository in `rmig failed` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    pub name: String,
    pub status: RepoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    pub retryable: bool,
    pub attempt_count: u32,
    #[serde(with = "opt_timestamp")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn status_summary(
    state: &MigrationState,
    state_path: &str,
    inactivity_cutoff_days: u32,
    now: DateTime<Utc>,
) -> StatusSummary {
    let counts = state.counts();
    let resync_candidates = state
        .repos
        .iter()
        .filter(|(_, repo)| resync_candidate(repo, inactivity_cutoff_days, now))
        .count();
    StatusSummary {
        source_org: state.source_org.clone(),
        target_org: state.target_org.clone(),
        state_path: state_path.to_string(),
        last_discovery: state.last_discovery,
        total_repos: state.total_repos,
        tracked: state.repos.len(),
        counts,
        resync_candidates,
        next_action: next_action(state, &counts, resync_candidates),
    }
}

fn next_action(state: &MigrationState, counts: &StatusCounts, resync_candidates: usize) -> String {
    if state.repos.is_empty() {
        return "rmig discover".to_string();
    }
    if counts.pending + counts.in_progress + counts.failed_retryable > 0 {
        return "rmig run".to_string();
    }
    if resync_candidates > 0 {
        return "rmig run (resync)".to_string();
    }
    if counts.failed_permanent + counts.resync_blocked > 0 {
        return "rmig failed --permanent, then rmig reset --repo <name>".to_string();
    }
    "none".to_string()
}

/// Failed records in insertion order, optionally only permanent ones.
///
/// Completed records whose resync failed permanently are listed too, since
/// they need the same operator attention.
pub fn failed_entries(state: &MigrationState, permanent_only: bool) -> Vec<FailedEntry> {
    state
        .repos
        .iter()
        .filter(|(_, repo)| repo.status == RepoStatus::Failed || repo.is_blocked_resync())
        .filter(|(_, repo)| {
            !permanent_only || repo.is_permanent_failure() || repo.is_blocked_resync()
        })
        .map(|(name, repo)| FailedEntry {
            name: name.to_string(),
            status: repo.status,
            error_type: repo.error_type,
            retryable: repo.is_retryable_failure(),
            attempt_count: repo.attempt_count,
            last_attempt: repo.last_attempt,
            error: repo.error.clone(),
        })
        .collect()
}

pub(crate) fn run_status(args: StatusArgs) -> Result<()> {
    let ctx = MigrateContext::load(&args.common)?;
    let state = ctx.inspect_state();
    let summary = status_summary(
        &state,
        &ctx.state_path.display().to_string(),
        ctx.config.inactivity_cutoff_days,
        Utc::now(),
    );
    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize status")?;
        println!("{text}");
        return Ok(());
    }
    let counts = &summary.counts;
    println!(
        "{} -> {} ({})",
        summary.source_org, summary.target_org, summary.state_path
    );
    println!(
        "last discovery: {}",
        summary
            .last_discovery
            .map(|ts| format_timestamp(&ts))
            .unwrap_or_else(|| "never".to_string())
    );
    println!("repositories: {} tracked", summary.tracked);
    println!("  completed:   {}", counts.completed);
    println!("  pending:     {}", counts.pending);
    println!("  in progress: {}", counts.in_progress);
    println!(
        "  failed:      {} ({} retryable, {} permanent)",
        counts.failed, counts.failed_retryable, counts.failed_permanent
    );
    println!("  skipped:     {}", counts.skipped);
    println!(
        "resync candidates: {} ({} blocked by permanent failures)",
        summary.resync_candidates, counts.resync_blocked
    );
    println!("next: {}", summary.next_action);
    Ok(())
}

pub(crate) fn run_failed(args: FailedArgs) -> Result<()> {
    let ctx = MigrateContext::load(&args.common)?;
    let state = ctx.inspect_state();
    let entries = failed_entries(&state, args.permanent);
    if args.json {
        let text = serde_json::to_string_pretty(&entries).context("serialize failures")?;
        println!("{text}");
        return Ok(());
    }
    if entries.is_empty() {
        println!("No failed repositories.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{}{} [{}] attempts={}{}: {}",
            entry.name,
            if entry.status == RepoStatus::Completed {
                " (resync)"
            } else {
                ""
            },
            entry
                .error_type
                .map(|error_type| error_type.as_str())
                .unwrap_or("unclassified"),
            entry.attempt_count,
            if entry.retryable { "" } else { " (no retry)" },
            entry.error.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}
