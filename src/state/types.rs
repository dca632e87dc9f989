//! Persisted schema types for the migration state snapshot.
//!
//! These types mirror the JSON state file one-to-one (camelCase keys) so the
//! snapshot stays readable by operators and by older runs.
use super::repo_map::RepoMap;
use super::timestamp::opt_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a single repository.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl RepoStatus {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "pending",
            RepoStatus::InProgress => "in_progress",
            RepoStatus::Completed => "completed",
            RepoStatus::Failed => "failed",
            RepoStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry class assigned to a failure when it is recorded.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Transient,
    Recoverable,
    Permanent,
}

impl ErrorType {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Transient => "transient",
            ErrorType::Recoverable => "recoverable",
            ErrorType::Permanent => "permanent",
        }
    }

    /// Whether the scheduler may pick the entity up again without an operator.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorType::Permanent)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered phase progress for one repository.
///
/// The persisted format keeps two booleans (`apiMigration`, `branchSync`);
/// in memory the progress is a single ordered value so "synced but not
/// migrated" cannot be represented.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(from = "PhaseFlags", into = "PhaseFlags")]
pub enum PhaseProgress {
    #[default]
    NotStarted,
    ApiMigrated,
    Synced,
}

impl PhaseProgress {
    pub fn api_migrated(&self) -> bool {
        *self >= PhaseProgress::ApiMigrated
    }

    pub fn branch_synced(&self) -> bool {
        *self == PhaseProgress::Synced
    }

    /// Move forward to `next`; never moves backwards.
    pub fn advance_to(&mut self, next: PhaseProgress) {
        if next > *self {
            *self = next;
        }
    }
}

/// Wire form of [`PhaseProgress`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhaseFlags {
    #[serde(default)]
    pub api_migration: bool,
    #[serde(default)]
    pub branch_sync: bool,
}

impl From<PhaseFlags> for PhaseProgress {
    fn from(flags: PhaseFlags) -> Self {
        match (flags.api_migration, flags.branch_sync) {
            (true, true) => PhaseProgress::Synced,
            (true, false) => PhaseProgress::ApiMigrated,
            // A sync without the API phase is not a state the runner produces;
            // start over and let the idempotent exists() check short-circuit.
            (false, _) => PhaseProgress::NotStarted,
        }
    }
}

impl From<PhaseProgress> for PhaseFlags {
    fn from(progress: PhaseProgress) -> Self {
        PhaseFlags {
            api_migration: progress.api_migrated(),
            branch_sync: progress.branch_synced(),
        }
    }
}

/// Per-repository migration record.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepoState {
    #[serde(default)]
    pub status: RepoStatus,
    #[serde(default)]
    pub phases: PhaseProgress,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub remote_last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

impl RepoState {
    /// Failed with a retry class the scheduler may pick up again.
    ///
    /// Records written before classification existed carry no error type and
    /// are treated as transient.
    pub fn is_retryable_failure(&self) -> bool {
        self.status == RepoStatus::Failed
            && self
                .error_type
                .map(|error_type| error_type.is_retryable())
                .unwrap_or(true)
    }

    pub fn is_permanent_failure(&self) -> bool {
        self.status == RepoStatus::Failed && self.error_type == Some(ErrorType::Permanent)
    }

    /// Completed once, but the last resync failed permanently.
    ///
    /// These stay completed and are held back from resync until an operator
    /// resets them.
    pub fn is_blocked_resync(&self) -> bool {
        self.status == RepoStatus::Completed && self.error_type == Some(ErrorType::Permanent)
    }
}

/// Merge-patch for a single [`RepoState`].
///
/// `None` leaves a field untouched. The error fields are doubly optional so a
/// patch can clear them explicitly.
#[derive(Debug, Clone, Default)]
pub struct RepoPatch {
    pub status: Option<RepoStatus>,
    pub phases: Option<PhaseProgress>,
    pub attempt_count: Option<u32>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub remote_last_modified: Option<DateTime<Utc>>,
    pub error: Option<Option<String>>,
    pub error_type: Option<Option<ErrorType>>,
}

impl RepoPatch {
    pub fn status(status: RepoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>, error_type: ErrorType) -> Self {
        self.error = Some(Some(message.into()));
        self.error_type = Some(Some(error_type));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self.error_type = Some(None);
        self
    }

    /// Apply the patch in place. Phase progress only moves forward.
    pub fn apply(self, repo: &mut RepoState) {
        if let Some(status) = self.status {
            repo.status = status;
        }
        if let Some(phases) = self.phases {
            repo.phases.advance_to(phases);
        }
        if let Some(attempt_count) = self.attempt_count {
            repo.attempt_count = repo.attempt_count.max(attempt_count);
        }
        if let Some(ts) = self.last_attempt {
            repo.last_attempt = Some(ts);
        }
        if let Some(ts) = self.completed_at {
            repo.completed_at = Some(ts);
        }
        if let Some(ts) = self.last_synced_at {
            repo.last_synced_at = Some(ts);
        }
        if let Some(ts) = self.remote_last_modified {
            repo.remote_last_modified = Some(ts);
        }
        if let Some(error) = self.error {
            repo.error = error;
        }
        if let Some(error_type) = self.error_type {
            repo.error_type = error_type;
        }
    }
}

/// Whole-run migration snapshot.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    pub version: u32,
    pub source_org: String,
    pub target_org: String,
    #[serde(default, with = "opt_timestamp", skip_serializing_if = "Option::is_none")]
    pub last_discovery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_repos: usize,
    #[serde(default)]
    pub repos: RepoMap,
}

impl MigrationState {
    /// Fresh snapshot with no repositories.
    pub fn new(source_org: &str, target_org: &str) -> Self {
        Self {
            version: super::STATE_SCHEMA_VERSION,
            source_org: source_org.to_string(),
            target_org: target_org.to_string(),
            last_discovery: None,
            total_repos: 0,
            repos: RepoMap::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RepoState> {
        self.repos.get(name)
    }

    /// Merge-patch one repository, creating it with defaults when absent.
    pub fn upsert(&mut self, name: &str, patch: RepoPatch) -> &RepoState {
        let repo = self.repos.get_or_insert_default(name);
        patch.apply(repo);
        repo
    }

    /// Count repositories per status bucket.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for (_, repo) in self.repos.iter() {
            match repo.status {
                RepoStatus::Pending => counts.pending += 1,
                RepoStatus::InProgress => counts.in_progress += 1,
                RepoStatus::Completed => {
                    counts.completed += 1;
                    if repo.is_blocked_resync() {
                        counts.resync_blocked += 1;
                    }
                }
                RepoStatus::Failed => {
                    counts.failed += 1;
                    if repo.is_retryable_failure() {
                        counts.failed_retryable += 1;
                    } else {
                        counts.failed_permanent += 1;
                    }
                }
                RepoStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

/// Per-status totals used by status output and plan stats.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
    /// Completed records whose resync failed permanently.
    #[serde(default)]
    pub resync_blocked: usize,
    pub skipped: usize,
}
