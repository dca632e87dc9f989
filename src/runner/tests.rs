use super::*;
use crate::state::{read_state, MigrationState};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Default)]
struct FakeMigrator {
    exists: RefCell<VecDeque<Result<bool, RemoteError>>>,
    migrate: RefCell<VecDeque<Result<(), RemoteError>>>,
    calls: RefCell<Vec<&'static str>>,
}

impl FakeMigrator {
    fn new(exists: bool) -> Self {
        let fake = Self::default();
        fake.exists.borrow_mut().push_back(Ok(exists));
        fake
    }

    fn with_migrate(self, result: Result<(), RemoteError>) -> Self {
        self.migrate.borrow_mut().push_back(result);
        self
    }
}

impl ApiMigrator for FakeMigrator {
    fn exists(&self, _name: &str) -> Result<bool, RemoteError> {
        self.calls.borrow_mut().push("exists");
        self.exists.borrow_mut().pop_front().unwrap_or(Ok(false))
    }

    fn migrate(&self, _name: &str, _params: &MigrateParams) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push("migrate");
        self.migrate.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default)]
struct FakeSyncer {
    results: RefCell<VecDeque<Result<SyncOutcome, RemoteError>>>,
    calls: RefCell<usize>,
    snapshot_path: Option<PathBuf>,
    observed: RefCell<Option<MigrationState>>,
}

impl FakeSyncer {
    fn failing(err: RemoteError) -> Self {
        let fake = Self::default();
        fake.results.borrow_mut().push_back(Err(err));
        fake
    }

    fn observing(path: &Path) -> Self {
        Self {
            snapshot_path: Some(path.to_path_buf()),
            ..Self::default()
        }
    }
}

impl ContentSyncer for FakeSyncer {
    fn sync(&self, _name: &str) -> Result<SyncOutcome, RemoteError> {
        *self.calls.borrow_mut() += 1;
        if let Some(path) = &self.snapshot_path {
            *self.observed.borrow_mut() = Some(read_state(path).expect("read checkpoint"));
        }
        self.results
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(SyncOutcome { items_processed: 4 }))
    }
}

fn params() -> MigrateParams {
    MigrateParams {
        source_org: "src".into(),
        private: true,
    }
}

fn no_wait() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        backoff: Duration::ZERO,
    }
}

fn store_in(dir: &tempfile::TempDir) -> StateStore {
    StateStore::load(&dir.path().join("state.json"), "src", "dst")
}

fn run_one(
    store: &mut StateStore,
    migrator: &FakeMigrator,
    syncer: &FakeSyncer,
    name: &str,
) -> RunOutcome {
    PhaseRunner::new(store, migrator, syncer, params(), no_wait())
        .run(name)
        .expect("run repo")
}

#[test]
fn fresh_repo_runs_both_phases_and_completes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(outcome.succeeded());
    assert_eq!(outcome.items_synced, Some(4));
    assert_eq!(*migrator.calls.borrow(), vec!["exists", "migrate"]);
    assert_eq!(*syncer.calls.borrow(), 1);

    let saved = read_state(store.path()).expect("read state");
    let repo = saved.get("svc").expect("record");
    assert_eq!(repo.status, RepoStatus::Completed);
    assert_eq!(repo.phases, PhaseProgress::Synced);
    assert_eq!(repo.attempt_count, 1);
    assert!(repo.completed_at.is_some());
    assert_eq!(repo.completed_at, repo.last_synced_at);
    assert!(repo.error.is_none());
}

#[test]
fn resume_after_api_phase_only_invokes_syncer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    store.upsert(
        "svc",
        RepoPatch {
            phases: Some(PhaseProgress::ApiMigrated),
            attempt_count: Some(1),
            ..RepoPatch::status(RepoStatus::Failed)
        }
        .with_error("git push failed: 503", ErrorType::Transient),
    );
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(outcome.succeeded());
    assert!(migrator.calls.borrow().is_empty());
    assert_eq!(*syncer.calls.borrow(), 1);
    let repo = store.get("svc").unwrap();
    assert_eq!(repo.attempt_count, 2);
    assert_eq!(repo.status, RepoStatus::Completed);
    assert!(repo.error_type.is_none());
}

#[test]
fn api_phase_is_checkpointed_before_sync_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::observing(store.path());

    run_one(&mut store, &migrator, &syncer, "svc");
    let observed = syncer.observed.borrow().clone().expect("sync observed state");
    let repo = observed.get("svc").expect("record");
    assert!(repo.phases.api_migrated());
    assert!(!repo.phases.branch_synced());
    assert_eq!(repo.status, RepoStatus::InProgress);
    assert_eq!(repo.attempt_count, 1);
}

#[test]
fn existing_target_short_circuits_migrate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::new(true);
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(outcome.succeeded());
    assert_eq!(*migrator.calls.borrow(), vec!["exists"]);
}

#[test]
fn already_exists_conflict_counts_as_api_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator =
        FakeMigrator::new(false).with_migrate(Err(RemoteError::Conflict("HTTP 409".into())));
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(outcome.succeeded());
    assert_eq!(store.get("svc").unwrap().status, RepoStatus::Completed);
}

#[test]
fn other_recoverable_failures_do_not_complete_the_phase() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::new(false)
        .with_migrate(Err(RemoteError::Other("update conflict on default branch".into())));
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert_eq!(outcome.status, RepoStatus::Failed);
    assert_eq!(outcome.failed_phase, Some(Phase::ApiMigration));
    assert_eq!(outcome.error_type, Some(ErrorType::Recoverable));
    assert_eq!(*syncer.calls.borrow(), 0);
    let repo = store.get("svc").unwrap();
    assert_eq!(repo.phases, PhaseProgress::NotStarted);
}

#[test]
fn permanent_api_failure_stops_before_sync() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::new(false)
        .with_migrate(Err(RemoteError::Unauthorized("HTTP 403".into())));
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(!outcome.succeeded());
    assert_eq!(*migrator.calls.borrow(), vec!["exists", "migrate"]);
    assert_eq!(*syncer.calls.borrow(), 0);

    let saved = read_state(store.path()).expect("read state");
    let repo = saved.get("svc").unwrap();
    assert_eq!(repo.status, RepoStatus::Failed);
    assert_eq!(repo.error_type, Some(ErrorType::Permanent));
    assert_eq!(repo.error.as_deref(), Some("unauthorized: HTTP 403"));
}

#[test]
fn sync_failure_keeps_api_flag_for_next_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::failing(RemoteError::Other(
        "git push failed: remote: 404 Not Found".into(),
    ));

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert_eq!(outcome.failed_phase, Some(Phase::BranchSync));
    assert_eq!(outcome.error_type, Some(ErrorType::Permanent));
    let repo = store.get("svc").unwrap().clone();
    assert_eq!(repo.status, RepoStatus::Failed);
    assert_eq!(repo.phases, PhaseProgress::ApiMigrated);

    let retry_migrator = FakeMigrator::new(false);
    let retry_syncer = FakeSyncer::default();
    let outcome = run_one(&mut store, &retry_migrator, &retry_syncer, "svc");
    assert!(outcome.succeeded());
    assert!(retry_migrator.calls.borrow().is_empty());
    assert_eq!(store.get("svc").unwrap().attempt_count, 2);
}

#[test]
fn transient_exists_failures_retry_within_the_operation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::default();
    {
        let mut exists = migrator.exists.borrow_mut();
        exists.push_back(Err(RemoteError::Transport("connection reset".into())));
        exists.push_back(Err(RemoteError::Transport("connection reset".into())));
        exists.push_back(Ok(true));
    }
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(outcome.succeeded());
    assert_eq!(*migrator.calls.borrow(), vec!["exists", "exists", "exists"]);
    assert_eq!(store.get("svc").unwrap().attempt_count, 1);
}

#[test]
fn exhausted_transient_retries_record_transient_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    let migrator = FakeMigrator::default();
    for _ in 0..3 {
        migrator
            .exists
            .borrow_mut()
            .push_back(Err(RemoteError::RateLimited("HTTP 429".into())));
    }
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert_eq!(outcome.error_type, Some(ErrorType::Transient));
    assert_eq!(migrator.calls.borrow().len(), 3);
}

fn completed_record(store: &mut StateStore) {
    store.upsert(
        "svc",
        RepoPatch {
            phases: Some(PhaseProgress::Synced),
            attempt_count: Some(1),
            completed_at: Some(crate::state::parse_timestamp("2024-01-01").unwrap()),
            last_synced_at: Some(crate::state::parse_timestamp("2024-01-01").unwrap()),
            remote_last_modified: Some(crate::state::parse_timestamp("2024-02-01").unwrap()),
            ..RepoPatch::status(RepoStatus::Completed)
        },
    );
}

#[test]
fn resync_only_runs_content_sync() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    completed_record(&mut store);
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::default();

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(outcome.resync);
    assert!(outcome.succeeded());
    assert!(migrator.calls.borrow().is_empty());
    let repo = store.get("svc").unwrap();
    assert_eq!(repo.status, RepoStatus::Completed);
    assert_eq!(repo.attempt_count, 2);
    assert!(repo.last_synced_at > repo.remote_last_modified);
    assert_eq!(
        repo.completed_at,
        Some(crate::state::parse_timestamp("2024-01-01").unwrap())
    );
}

fn resync_options() -> crate::schedule::SelectOptions {
    crate::schedule::SelectOptions {
        max_count: 10,
        include_sync: true,
        inactivity_cutoff_days: 0,
        max_attempts: None,
    }
}

#[test]
fn transient_resync_failure_stays_completed_and_selectable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    completed_record(&mut store);
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::default();
    for _ in 0..3 {
        syncer
            .results
            .borrow_mut()
            .push_back(Err(RemoteError::Transport("connection reset".into())));
    }

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert_eq!(outcome.error_type, Some(ErrorType::Transient));
    let repo = store.get("svc").unwrap();
    assert_eq!(repo.status, RepoStatus::Completed);
    assert_eq!(repo.phases, PhaseProgress::Synced);
    let picked = crate::schedule::select_work(store.state(), &resync_options(), Utc::now());
    assert_eq!(picked, vec!["svc"]);
}

#[test]
fn permanent_resync_failure_is_not_reselected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = store_in(&dir);
    completed_record(&mut store);
    let migrator = FakeMigrator::new(false);
    let syncer = FakeSyncer::failing(RemoteError::Unauthorized("HTTP 403".into()));

    let outcome = run_one(&mut store, &migrator, &syncer, "svc");
    assert!(!outcome.succeeded());
    assert_eq!(*syncer.calls.borrow(), 1);
    let repo = store.get("svc").unwrap();
    assert_eq!(repo.status, RepoStatus::Completed);
    assert_eq!(repo.phases, PhaseProgress::Synced);
    assert_eq!(repo.error_type, Some(ErrorType::Permanent));
    assert_eq!(repo.attempt_count, 2);
    assert!(repo.is_blocked_resync());

    let picked = crate::schedule::select_work(store.state(), &resync_options(), Utc::now());
    assert!(picked.is_empty(), "{picked:?}");
    assert_eq!(store.state().counts().resync_blocked, 1);
}
