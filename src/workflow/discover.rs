//! Discovery: record every source repository in the state snapshot.
use super::MigrateContext;
use crate::classify::RemoteError;
use crate::cli::DiscoverArgs;
use crate::config::Filters;
use crate::remote::RemoteLister;
use crate::runner::{with_retries, RetryPolicy};
use crate::state::{MigrationState, RepoPatch, RepoStatus, StateStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counts from one discovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySummary {
    pub listed: usize,
    pub added: usize,
    pub skipped: usize,
    pub restored: usize,
    pub total_repos: usize,
}

/// List the source and fold the result into `state`.
///
/// Only the pending/skipped toggle and `remoteLastModified` are touched on
/// existing records; progress fields are left to the phase runner.
pub fn discover(
    state: &mut MigrationState,
    lister: &dyn RemoteLister,
    filters: &Filters,
    retry: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<DiscoverySummary, RemoteError> {
    let listed = with_retries(retry, "list", &state.source_org, || lister.list())?;
    let mut summary = DiscoverySummary {
        listed: listed.len(),
        ..DiscoverySummary::default()
    };
    for remote in listed {
        let name = remote.name;
        if state.get(&name).is_none() {
            summary.added += 1;
        }
        let status = state
            .upsert(
                &name,
                RepoPatch {
                    remote_last_modified: remote.last_modified,
                    ..RepoPatch::default()
                },
            )
            .status;
        let allowed = filters.allows(&name);
        match status {
            RepoStatus::Pending if !allowed => {
                state.upsert(&name, RepoPatch::status(RepoStatus::Skipped));
                summary.skipped += 1;
            }
            RepoStatus::Skipped if allowed => {
                state.upsert(&name, RepoPatch::status(RepoStatus::Pending));
                summary.restored += 1;
            }
            _ => {}
        }
    }
    state.total_repos = state.repos.len();
    state.last_discovery = Some(now);
    summary.total_repos = state.total_repos;
    Ok(summary)
}

pub(crate) fn run_discover(args: DiscoverArgs) -> Result<()> {
    let ctx = MigrateContext::load(&args.common)?;
    let mut store = ctx.open_store();
    let summary = discover_and_save(&ctx, &mut store)?;
    println!(
        "Discovered {} repositories ({} new, {} skipped by filters, {} restored); {} tracked",
        summary.listed, summary.added, summary.skipped, summary.restored, summary.total_repos
    );
    Ok(())
}

pub(crate) fn discover_and_save(
    ctx: &MigrateContext,
    store: &mut StateStore,
) -> Result<DiscoverySummary> {
    let filters = ctx.config.filters()?;
    let lister = ctx.source_api();
    let summary = discover(
        store.state_mut(),
        &lister,
        &filters,
        &ctx.config.retry_policy(),
        Utc::now(),
    )
    .with_context(|| format!("list repositories of {}", ctx.config.source.org))?;
    store.save()?;
    tracing::info!(
        listed = summary.listed,
        added = summary.added,
        skipped = summary.skipped,
        restored = summary.restored,
        "discovery complete"
    );
    Ok(summary)
}
