//! Drift detection for completed repositories.
use crate::state::{RepoState, RepoStatus};
use chrono::{DateTime, Duration, Utc};

/// Whether a completed repository changed upstream since its last sync.
///
/// With a positive `inactivity_cutoff_days`, repositories whose source has not
/// changed within the window are left alone. Legacy records without
/// `lastSyncedAt` need a sync once the remote timestamp is known.
pub fn needs_sync(repo: &RepoState, inactivity_cutoff_days: u32, now: DateTime<Utc>) -> bool {
    let Some(remote_modified) = repo.remote_last_modified else {
        return false;
    };
    if inactivity_cutoff_days > 0 {
        // A window reaching past the earliest representable instant excludes nothing.
        let cutoff = Duration::try_days(i64::from(inactivity_cutoff_days))
            .and_then(|window| now.checked_sub_signed(window));
        if cutoff.is_some_and(|cutoff| remote_modified < cutoff) {
            return false;
        }
    }
    match repo.last_synced_at {
        None => true,
        Some(synced) => remote_modified > synced,
    }
}

/// Completed, not held back by a permanent resync failure, and drifted.
pub fn resync_candidate(repo: &RepoState, inactivity_cutoff_days: u32, now: DateTime<Utc>) -> bool {
    repo.status == RepoStatus::Completed
        && !repo.is_blocked_resync()
        && needs_sync(repo, inactivity_cutoff_days, now)
}
