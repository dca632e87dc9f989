//! Priority-ordered work selection for a single run.
use super::resync_candidate;
use crate::state::{MigrationState, RepoState, RepoStatus};
use chrono::{DateTime, Utc};

/// Knobs for [`select_work`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOptions {
    pub max_count: usize,
    pub include_sync: bool,
    pub inactivity_cutoff_days: u32,
    /// Retry ceiling for failed repositories; `None` retries without bound.
    pub max_attempts: Option<u32>,
}

/// Why a repository was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Retry,
    Pending,
    Resync,
}

/// Selected work split by priority bucket, before truncation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkBuckets {
    pub retry: Vec<String>,
    pub pending: Vec<String>,
    pub resync: Vec<String>,
}

impl WorkBuckets {
    /// Concatenate buckets in priority order and cap the result.
    pub fn into_ordered(self, max_count: usize) -> Vec<String> {
        self.retry
            .into_iter()
            .chain(self.pending)
            .chain(self.resync)
            .take(max_count)
            .collect()
    }
}

/// Classify one record into its work bucket, if any.
pub fn work_kind(
    repo: &RepoState,
    options: &SelectOptions,
    now: DateTime<Utc>,
) -> Option<WorkKind> {
    match repo.status {
        RepoStatus::Failed => {
            let under_ceiling = options
                .max_attempts
                .map(|ceiling| repo.attempt_count < ceiling)
                .unwrap_or(true);
            (repo.is_retryable_failure() && under_ceiling).then_some(WorkKind::Retry)
        }
        // An in-progress record on disk means a run was interrupted mid-repo;
        // phase flags make picking it back up safe.
        RepoStatus::Pending | RepoStatus::InProgress => Some(WorkKind::Pending),
        RepoStatus::Completed => (options.include_sync
            && resync_candidate(repo, options.inactivity_cutoff_days, now))
        .then_some(WorkKind::Resync),
        RepoStatus::Skipped => None,
    }
}

/// Bucket every repository in insertion order.
pub fn bucket_work(
    state: &MigrationState,
    options: &SelectOptions,
    now: DateTime<Utc>,
) -> WorkBuckets {
    let mut buckets = WorkBuckets::default();
    for (name, repo) in state.repos.iter() {
        match work_kind(repo, options, now) {
            Some(WorkKind::Retry) => buckets.retry.push(name.to_string()),
            Some(WorkKind::Pending) => buckets.pending.push(name.to_string()),
            Some(WorkKind::Resync) => buckets.resync.push(name.to_string()),
            None => {}
        }
    }
    buckets
}

/// Ordered, bounded list of repositories to process this run.
///
/// Retryable failures come first, then pending work, then (when enabled)
/// completed repositories that drifted. Each group keeps insertion order.
pub fn select_work(
    state: &MigrationState,
    options: &SelectOptions,
    now: DateTime<Utc>,
) -> Vec<String> {
    bucket_work(state, options, now).into_ordered(options.max_count)
}
