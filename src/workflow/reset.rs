//! Operator reset: put repositories back to pending.
use super::MigrateContext;
use crate::cli::ResetArgs;
use crate::state::{MigrationState, RepoPatch, RepoStatus};
use anyhow::{anyhow, Result};

/// Return `names` to pending with their error cleared.
///
/// Phase progress and attempt counts are kept, so a reset repository resumes
/// at its first unfinished phase. Unknown names are an error and nothing is
/// changed.
pub fn reset_repos(state: &mut MigrationState, names: &[String]) -> Result<()> {
    let unknown: Vec<&str> = names
        .iter()
        .filter(|name| state.get(name).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(anyhow!("unknown repositories: {}", unknown.join(", ")));
    }
    for name in names {
        let previous = state
            .upsert(name, RepoPatch::status(RepoStatus::Pending).clear_error())
            .phases;
        tracing::info!(repo = %name, phases = ?previous, "reset to pending");
    }
    Ok(())
}

pub(crate) fn run_reset(args: ResetArgs) -> Result<()> {
    let ctx = MigrateContext::load(&args.common)?;
    let mut store = ctx.open_store();
    reset_repos(store.state_mut(), &args.repos)?;
    store.save()?;
    println!(
        "Reset {} repositories to pending in {}",
        args.repos.len(),
        store.path().display()
    );
    Ok(())
}
