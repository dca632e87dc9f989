//! Per-repository phase state machine.
//!
//! A repository moves `pending -> in_progress -> completed | failed`. The API
//! phase runs before the content sync and is never repeated once its flag is
//! set, so a crashed or failed run resumes at the content sync. The snapshot
//! is saved on entry and after every phase outcome.
mod retry;

pub use retry::{with_retries, RetryPolicy};

use crate::classify::{classify, is_already_exists, RemoteError};
use crate::remote::{ApiMigrator, ContentSyncer, MigrateParams, SyncOutcome};
use crate::state::{ErrorType, PhaseProgress, RepoPatch, RepoState, RepoStatus, StateStore};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

/// Which phase a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ApiMigration,
    BranchSync,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ApiMigration => "api_migration",
            Phase::BranchSync => "branch_sync",
        }
    }
}

/// Result of processing one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub repo: String,
    pub status: RepoStatus,
    pub resync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_synced: Option<usize>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.error_type.is_none()
    }
}

/// Drives one repository at a time through both phases.
pub struct PhaseRunner<'a> {
    store: &'a mut StateStore,
    migrator: &'a dyn ApiMigrator,
    syncer: &'a dyn ContentSyncer,
    params: MigrateParams,
    retry: RetryPolicy,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        store: &'a mut StateStore,
        migrator: &'a dyn ApiMigrator,
        syncer: &'a dyn ContentSyncer,
        params: MigrateParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            migrator,
            syncer,
            params,
            retry,
        }
    }

    /// Process `name` and persist every state transition.
    ///
    /// Repositories that finished both phases get a content resync (this also
    /// covers a resync interrupted mid-flight, which leaves `in_progress` with
    /// both flags set). Everything else runs its remaining phases. Errors are
    /// only returned when the snapshot cannot be saved; remote failures are
    /// recorded in the outcome.
    pub fn run(&mut self, name: &str) -> Result<RunOutcome> {
        let synced = self
            .store
            .get(name)
            .is_some_and(|repo| repo.phases.branch_synced());
        if synced {
            self.resync(name)
        } else {
            self.migrate(name)
        }
    }

    fn migrate(&mut self, name: &str) -> Result<RunOutcome> {
        let repo = self.enter(name)?;
        tracing::info!(
            repo = %name,
            attempt = repo.attempt_count,
            phases = ?repo.phases,
            "migration started"
        );

        if repo.phases.api_migrated() {
            tracing::debug!(repo = %name, "api migration already recorded; skipping");
        } else {
            if let Err(err) = self.api_phase(name) {
                return self.fail(name, Phase::ApiMigration, err);
            }
            self.store.upsert(
                name,
                RepoPatch {
                    phases: Some(PhaseProgress::ApiMigrated),
                    ..RepoPatch::default()
                },
            );
            self.store.save()?;
        }

        let items_synced = match self.sync_phase(name) {
            Ok(outcome) => outcome.items_processed,
            Err(err) => return self.fail(name, Phase::BranchSync, err),
        };

        let now = Utc::now();
        self.store.upsert(
            name,
            RepoPatch {
                phases: Some(PhaseProgress::Synced),
                completed_at: Some(now),
                last_synced_at: Some(now),
                ..RepoPatch::status(RepoStatus::Completed)
            }
            .clear_error(),
        );
        self.store.save()?;
        tracing::info!(repo = %name, refs = items_synced, "migration completed");
        Ok(RunOutcome {
            repo: name.to_string(),
            status: RepoStatus::Completed,
            resync: false,
            failed_phase: None,
            error: None,
            error_type: None,
            items_synced: Some(items_synced),
        })
    }

    /// Content-only sync for a completed repository whose source drifted.
    ///
    /// A failed resync leaves the record completed (both phases did succeed
    /// once) with the error attached and `lastSyncedAt` unchanged. Transient
    /// and recoverable failures are picked up by the next sync-enabled run;
    /// permanent ones are held back until an operator reset.
    fn resync(&mut self, name: &str) -> Result<RunOutcome> {
        let repo = self.enter(name)?;
        tracing::info!(repo = %name, attempt = repo.attempt_count, "resync started");
        match self.sync_phase(name) {
            Ok(outcome) => {
                self.store.upsert(
                    name,
                    RepoPatch {
                        last_synced_at: Some(Utc::now()),
                        ..RepoPatch::status(RepoStatus::Completed)
                    }
                    .clear_error(),
                );
                self.store.save()?;
                tracing::info!(repo = %name, refs = outcome.items_processed, "resync completed");
                Ok(RunOutcome {
                    repo: name.to_string(),
                    status: RepoStatus::Completed,
                    resync: true,
                    failed_phase: None,
                    error: None,
                    error_type: None,
                    items_synced: Some(outcome.items_processed),
                })
            }
            Err(err) => {
                let error_type = classify(&err);
                let message = err.to_string();
                tracing::warn!(
                    repo = %name,
                    error_type = %error_type,
                    error = %message,
                    "resync failed"
                );
                self.store.upsert(
                    name,
                    RepoPatch::status(RepoStatus::Completed)
                        .with_error(message.clone(), error_type),
                );
                self.store.save()?;
                Ok(RunOutcome {
                    repo: name.to_string(),
                    status: RepoStatus::Completed,
                    resync: true,
                    failed_phase: Some(Phase::BranchSync),
                    error: Some(message),
                    error_type: Some(error_type),
                    items_synced: None,
                })
            }
        }
    }

    /// Checkpoint entry into `in_progress` before any remote call.
    fn enter(&mut self, name: &str) -> Result<RepoState> {
        let attempt_count = self
            .store
            .get(name)
            .map(|repo| repo.attempt_count)
            .unwrap_or(0)
            + 1;
        let repo = self
            .store
            .upsert(
                name,
                RepoPatch {
                    attempt_count: Some(attempt_count),
                    last_attempt: Some(Utc::now()),
                    ..RepoPatch::status(RepoStatus::InProgress)
                },
            )
            .clone();
        self.store.save()?;
        Ok(repo)
    }

    fn api_phase(&self, name: &str) -> Result<(), RemoteError> {
        let exists = with_retries(&self.retry, "exists", name, || self.migrator.exists(name))?;
        if exists {
            tracing::info!(repo = %name, "target already exists; api migration satisfied");
            return Ok(());
        }
        match with_retries(&self.retry, "migrate", name, || {
            self.migrator.migrate(name, &self.params)
        }) {
            Ok(()) => Ok(()),
            Err(err) if is_already_exists(&err) => {
                tracing::info!(
                    repo = %name,
                    error = %err,
                    "target reports existing repository; api migration satisfied"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn sync_phase(&self, name: &str) -> Result<SyncOutcome, RemoteError> {
        with_retries(&self.retry, "sync", name, || self.syncer.sync(name))
    }

    fn fail(&mut self, name: &str, phase: Phase, err: RemoteError) -> Result<RunOutcome> {
        let error_type = classify(&err);
        let message = err.to_string();
        tracing::warn!(
            repo = %name,
            phase = phase.as_str(),
            error_type = %error_type,
            error = %message,
            "phase failed"
        );
        self.store.upsert(
            name,
            RepoPatch::status(RepoStatus::Failed).with_error(message.clone(), error_type),
        );
        self.store.save()?;
        Ok(RunOutcome {
            repo: name.to_string(),
            status: RepoStatus::Failed,
            resync: false,
            failed_phase: Some(phase),
            error: Some(message),
            error_type: Some(error_type),
            items_synced: None,
        })
    }
}

#[cfg(test)]
mod tests;
