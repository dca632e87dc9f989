//! Scheduling: which repositories to touch on this run, and in what order.
mod batch;
mod select;
mod sync;

pub use batch::{build_plan, load_plan, write_plan, BatchPlan, PlanStats};
pub use select::{bucket_work, select_work, SelectOptions};
pub use sync::resync_candidate;
