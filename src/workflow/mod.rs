//! Command orchestration.
//!
//! Each command loads the config, opens the snapshot, and delegates to the
//! state, scheduling, and runner modules; none of them hold policy of their
//! own beyond CLI overrides.
mod context;
mod discover;
mod merge;
mod plan;
mod reset;
mod run;
mod status;

pub(crate) use context::MigrateContext;
pub(crate) use discover::run_discover;
pub(crate) use merge::run_merge;
pub(crate) use plan::run_plan;
pub(crate) use reset::run_reset;
pub(crate) use run::run_run;
pub(crate) use status::{run_failed, run_status};
