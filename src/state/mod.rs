//! Migration state schema and persistence.
//!
//! The state module owns the snapshot format, the store that checkpoints it,
//! and the merge rules used to fold sharded runs back together.
/// Current schema version for the migration state file.
pub const STATE_SCHEMA_VERSION: u32 = 1;

mod merge;
mod repo_map;
mod store;
mod timestamp;
mod types;

pub use merge::{merge_into, MergeReport};
pub use repo_map::RepoMap;
pub use store::{read_state, write_state, StateStore};
pub use timestamp::{format_timestamp, opt_timestamp, parse_timestamp};
pub use types::*;
