//! Reconcile partial snapshots from sharded runs into the canonical state.
//!
//! Shards are assumed disjoint; when two snapshots do disagree about a
//! repository, a completed record always wins and otherwise the most recent
//! attempt wins.
use super::{MigrationState, RepoState, RepoStatus};
use serde::Serialize;

/// Per-merge bookkeeping for logs and CLI output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Names that were new to the canonical snapshot.
    pub added: usize,
    /// Existing records replaced by the incoming record.
    pub adopted: usize,
    /// Existing records kept over the incoming record.
    pub kept: usize,
}

impl MergeReport {
    pub fn absorb(&mut self, other: MergeReport) {
        self.added += other.added;
        self.adopted += other.adopted;
        self.kept += other.kept;
    }
}

/// Whether `incoming` should replace `current` in the canonical snapshot.
pub fn should_adopt(current: Option<&RepoState>, incoming: &RepoState) -> bool {
    let Some(current) = current else {
        return true;
    };
    if incoming.status == RepoStatus::Completed {
        return true;
    }
    match (incoming.last_attempt, current.last_attempt) {
        (Some(incoming_at), Some(current_at)) => incoming_at > current_at,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Fold `partial` into `canonical` in place.
pub fn merge_into(canonical: &mut MigrationState, partial: MigrationState) -> MergeReport {
    let mut report = MergeReport::default();
    let MigrationState {
        repos,
        last_discovery,
        total_repos,
        ..
    } = partial;

    for (name, incoming) in repos.iter() {
        let current = canonical.repos.get(name);
        let existed = current.is_some();
        if should_adopt(current, incoming) {
            canonical.repos.insert(name, incoming.clone());
            if existed {
                report.adopted += 1;
            } else {
                report.added += 1;
            }
        } else {
            report.kept += 1;
        }
    }

    canonical.last_discovery = match (canonical.last_discovery, last_discovery) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    canonical.total_repos = canonical
        .total_repos
        .max(total_repos)
        .max(canonical.repos.len());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{parse_timestamp, ErrorType, PhaseProgress};

    fn record(status: RepoStatus, last_attempt: Option<&str>) -> RepoState {
        RepoState {
            status,
            last_attempt: last_attempt.map(|ts| parse_timestamp(ts).expect("timestamp")),
            ..RepoState::default()
        }
    }

    fn merge(
        mut canonical: MigrationState,
        partial: MigrationState,
    ) -> (MigrationState, MergeReport) {
        let report = merge_into(&mut canonical, partial);
        (canonical, report)
    }

    fn state_with(name: &str, repo: RepoState) -> MigrationState {
        let mut state = MigrationState::new("src", "dst");
        state.repos.insert(name, repo);
        state
    }

    #[test]
    fn completed_incoming_wins_even_when_older() {
        let canonical = state_with("a", record(RepoStatus::Failed, Some("2024-01-02")));
        let mut done = record(RepoStatus::Completed, Some("2024-01-01"));
        done.phases = PhaseProgress::Synced;
        let partial = state_with("a", done.clone());

        let (merged, report) = merge(canonical, partial);
        assert_eq!(merged.get("a"), Some(&done));
        assert_eq!(report.adopted, 1);
    }

    #[test]
    fn later_attempt_wins_among_non_completed() {
        let canonical = state_with("a", record(RepoStatus::Failed, Some("2024-01-01")));
        let mut newer = record(RepoStatus::Failed, Some("2024-01-03"));
        newer.error_type = Some(ErrorType::Recoverable);
        let partial = state_with("a", newer.clone());

        let (merged, _) = merge(canonical, partial);
        assert_eq!(merged.get("a"), Some(&newer));
    }

    #[test]
    fn stale_failure_does_not_regress_completed() {
        let mut done = record(RepoStatus::Completed, Some("2024-01-01"));
        done.phases = PhaseProgress::Synced;
        let canonical = state_with("a", done.clone());
        let partial = state_with("a", record(RepoStatus::Failed, Some("2024-01-01")));

        let (merged, report) = merge(canonical, partial);
        assert_eq!(merged.get("a"), Some(&done));
        assert_eq!(report.kept, 1);
    }

    #[test]
    fn absent_incoming_attempt_never_wins() {
        let canonical = state_with("a", record(RepoStatus::Failed, None));
        let partial = state_with("a", record(RepoStatus::Pending, None));
        let (merged, _) = merge(canonical, partial);
        assert_eq!(merged.get("a").map(|r| r.status), Some(RepoStatus::Failed));
    }

    #[test]
    fn new_names_are_appended_in_partial_order() {
        let canonical = state_with("a", record(RepoStatus::Pending, None));
        let mut partial = MigrationState::new("src", "dst");
        partial.repos.insert("c", record(RepoStatus::Pending, None));
        partial.repos.insert("b", record(RepoStatus::Pending, None));

        let (merged, report) = merge(canonical, partial);
        assert_eq!(merged.repos.names().collect::<Vec<_>>(), vec!["a", "c", "b"]);
        assert_eq!(report.added, 2);
        assert_eq!(merged.total_repos, 3);
    }
}
