//! Durable snapshot store for migration progress.
//!
//! The whole snapshot is rewritten on every checkpoint. Writes go through a
//! temp file in the same directory and an atomic rename, so a crash leaves
//! either the previous snapshot or the new one on disk.
use super::{MigrationState, RepoPatch, RepoState, RepoStatus, STATE_SCHEMA_VERSION};
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// In-memory snapshot bound to its backing file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: MigrationState,
    /// Set when the file on disk belongs to another source/target pair.
    foreign: Option<String>,
}

/// Why a snapshot on disk was not used.
enum Rejected {
    /// Unparseable or from a newer schema; nothing can read it.
    Unreadable(anyhow::Error),
    /// Valid, but for a different migration.
    Foreign(String),
}

impl StateStore {
    /// Load the snapshot at `path`, failing open to an empty state.
    ///
    /// A missing file yields a fresh state. An unreadable file is renamed
    /// aside and a fresh state is returned. A valid file for a different
    /// source/target pair is left in place; the store starts fresh in memory
    /// and refuses to save over it. This never returns an error.
    pub fn load(path: &Path, source_org: &str, target_org: &str) -> Self {
        let (state, foreign) = match read_validated(path, source_org, target_org) {
            Ok(state) => (state, None),
            Err(Rejected::Unreadable(err)) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "state snapshot is unreadable; starting fresh"
                );
                preserve_invalid(path);
                (MigrationState::new(source_org, target_org), None)
            }
            Err(Rejected::Foreign(owner)) => {
                tracing::warn!(
                    path = %path.display(),
                    snapshot = %owner,
                    "state snapshot belongs to another migration; it will not be overwritten"
                );
                (MigrationState::new(source_org, target_org), Some(owner))
            }
        };
        Self {
            path: path.to_path_buf(),
            state,
            foreign,
        }
    }

    /// Read the snapshot for display without touching the file.
    ///
    /// Falls back to a fresh in-memory state exactly where [`StateStore::load`]
    /// would, but never renames, repairs, or writes anything on disk.
    pub fn inspect(path: &Path, source_org: &str, target_org: &str) -> MigrationState {
        match read_validated(path, source_org, target_org) {
            Ok(state) => state,
            Err(Rejected::Unreadable(err)) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "state snapshot is unreadable; showing an empty state"
                );
                MigrationState::new(source_org, target_org)
            }
            Err(Rejected::Foreign(owner)) => {
                tracing::warn!(
                    path = %path.display(),
                    snapshot = %owner,
                    "state snapshot belongs to another migration; showing an empty state"
                );
                MigrationState::new(source_org, target_org)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MigrationState {
        &mut self.state
    }

    pub fn get(&self, name: &str) -> Option<&RepoState> {
        self.state.get(name)
    }

    /// Merge-patch one repository record; see [`MigrationState::upsert`].
    pub fn upsert(&mut self, name: &str, patch: RepoPatch) -> &RepoState {
        self.state.upsert(name, patch)
    }

    /// Persist the full snapshot, replacing whatever is on disk.
    ///
    /// Fails when the file holds another migration's snapshot.
    pub fn save(&self) -> Result<()> {
        if let Some(owner) = &self.foreign {
            return Err(anyhow!(
                "refusing to overwrite {}: it holds the {} snapshot, not {} -> {}",
                self.path.display(),
                owner,
                self.state.source_org,
                self.state.target_org
            ));
        }
        write_state(&self.path, &self.state)
    }
}

/// Read a snapshot strictly: missing or malformed files are errors.
pub fn read_state(path: &Path) -> Result<MigrationState> {
    let bytes = fs::read(path).with_context(|| format!("read state {}", path.display()))?;
    let mut state: MigrationState =
        serde_json::from_slice(&bytes).context("parse migration state JSON")?;
    if state.version > STATE_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported migration state version {} (max {})",
            state.version,
            STATE_SCHEMA_VERSION
        ));
    }
    normalize(&mut state);
    Ok(state)
}

/// Persist a snapshot atomically in a stable JSON format.
pub fn write_state(path: &Path, state: &MigrationState) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let text = serde_json::to_string_pretty(state).context("serialize migration state")?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    let tmp_path = tmp.path().to_path_buf();
    tmp.write_all(text.as_bytes())
        .with_context(|| format!("write {}", tmp_path.display()))?;
    tmp.write_all(b"\n")
        .with_context(|| format!("write {}", tmp_path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", tmp_path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn read_validated(
    path: &Path,
    source_org: &str,
    target_org: &str,
) -> std::result::Result<MigrationState, Rejected> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no state snapshot; starting fresh");
        return Ok(MigrationState::new(source_org, target_org));
    }
    let state = read_state(path).map_err(Rejected::Unreadable)?;
    if state.source_org != source_org || state.target_org != target_org {
        return Err(Rejected::Foreign(format!(
            "{} -> {}",
            state.source_org, state.target_org
        )));
    }
    tracing::debug!(
        path = %path.display(),
        repos = state.repos.len(),
        "loaded state snapshot"
    );
    Ok(state)
}

/// Repair records that break the completed-implies-synced invariant.
fn normalize(state: &mut MigrationState) {
    for (name, repo) in state.repos.iter_mut() {
        if repo.status == RepoStatus::Completed && !repo.phases.branch_synced() {
            tracing::warn!(
                repo = %name,
                phases = ?repo.phases,
                "completed record missing phase flags; resetting to pending"
            );
            repo.status = RepoStatus::Pending;
        }
    }
}

fn preserve_invalid(path: &Path) {
    let stamp = now_epoch_ms().unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".to_string());
    let backup = path.with_file_name(format!("{file_name}.invalid-{stamp}"));
    match fs::rename(path, &backup) {
        Ok(()) => tracing::warn!(backup = %backup.display(), "kept invalid snapshot"),
        Err(err) => tracing::warn!(
            path = %path.display(),
            error = %err,
            "could not move invalid snapshot aside"
        ),
    }
}
