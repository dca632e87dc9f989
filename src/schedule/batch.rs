//! Batch plans for sharded runs.
//!
//! A plan splits the selected work into fixed-size batches. External runners
//! execute batches in parallel (one process per batch) and fold their partial
//! snapshots back with `rmig merge`.
use crate::state::{opt_timestamp, StatusCounts};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One shard of work.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_number: usize,
    pub repos: Vec<String>,
}

/// Selection totals recorded alongside the plan.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanStats {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub retry_selected: usize,
    pub pending_selected: usize,
    pub resync_selected: usize,
    pub max_parallel: usize,
}

/// Plan file written by `rmig plan`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchPlan {
    #[serde(default, with = "opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub total_repos: usize,
    pub total_batches: usize,
    pub batches_to_run: usize,
    pub batches: Vec<Batch>,
    pub stats: PlanStats,
}

impl BatchPlan {
    pub fn batch(&self, batch_number: usize) -> Option<&Batch> {
        self.batches
            .iter()
            .find(|batch| batch.batch_number == batch_number)
    }
}

/// Chunk `selected` into batches and keep the first `max_batches_per_run`.
///
/// `total_repos` and `total_batches` describe the whole selection so operators
/// can see how much work remains beyond this run.
pub fn build_plan(
    selected: Vec<String>,
    stats: PlanStats,
    batch_size: usize,
    max_batches_per_run: usize,
    now: DateTime<Utc>,
) -> Result<BatchPlan> {
    if batch_size == 0 {
        return Err(anyhow!("batch size must be at least 1"));
    }
    let total_repos = selected.len();
    let total_batches = total_repos.div_ceil(batch_size);
    let batches_to_run = total_batches.min(max_batches_per_run);
    let batches = selected
        .chunks(batch_size)
        .take(batches_to_run)
        .enumerate()
        .map(|(idx, chunk)| Batch {
            batch_number: idx + 1,
            repos: chunk.to_vec(),
        })
        .collect();
    Ok(BatchPlan {
        timestamp: Some(now),
        total_repos,
        total_batches,
        batches_to_run,
        batches,
        stats,
    })
}

/// Load a plan file written by [`write_plan`].
pub fn load_plan(path: &Path) -> Result<BatchPlan> {
    let bytes = fs::read(path).with_context(|| format!("read plan {}", path.display()))?;
    let plan: BatchPlan = serde_json::from_slice(&bytes).context("parse batch plan JSON")?;
    Ok(plan)
}

/// Persist a plan in a stable JSON format.
pub fn write_plan(path: &Path, plan: &BatchPlan) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(plan).context("serialize batch plan")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
