//! Fold shard state files back into the canonical snapshot.
use super::MigrateContext;
use crate::cli::MergeArgs;
use crate::state::{merge_into, read_state, MergeReport, MigrationState};
use anyhow::{anyhow, Result};
use std::path::Path;

/// Merge every partial file into `canonical`, in order.
///
/// All partials are read and checked before anything is folded in, so an
/// unreadable or foreign partial leaves `canonical` untouched.
pub fn merge_partials(canonical: &mut MigrationState, partials: &[&Path]) -> Result<MergeReport> {
    let mut loaded = Vec::with_capacity(partials.len());
    for path in partials {
        let partial = read_state(path)?;
        if partial.source_org != canonical.source_org || partial.target_org != canonical.target_org
        {
            return Err(anyhow!(
                "partial {} is for {} -> {}, expected {} -> {}",
                path.display(),
                partial.source_org,
                partial.target_org,
                canonical.source_org,
                canonical.target_org
            ));
        }
        loaded.push((path, partial));
    }

    let mut report = MergeReport::default();
    for (path, partial) in loaded {
        let partial_report = merge_into(canonical, partial);
        tracing::info!(
            partial = %path.display(),
            added = partial_report.added,
            adopted = partial_report.adopted,
            kept = partial_report.kept,
            "merged partial state"
        );
        report.absorb(partial_report);
    }
    Ok(report)
}

pub(crate) fn run_merge(args: MergeArgs) -> Result<()> {
    let ctx = MigrateContext::load(&args.common)?;
    let mut store = ctx.open_store();
    let partials: Vec<&Path> = args.partials.iter().map(|path| path.as_path()).collect();
    let report = merge_partials(store.state_mut(), &partials)?;
    store.save()?;
    println!(
        "Merged {} partial files into {}: {} added, {} updated, {} kept",
        partials.len(),
        store.path().display(),
        report.added,
        report.adopted,
        report.kept
    );
    Ok(())
}
