//! CLI argument parsing for the migration workflow.
//!
//! Subcommands share the config/state/verbosity flags; everything else is
//! per-command overrides of the config file.
use crate::config::DEFAULT_CONFIG_PATH;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default plan file written by `rmig plan`.
pub const DEFAULT_PLAN_PATH: &str = "migration-plan.json";

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "rmig",
    version,
    about = "Resumable repository migration between hosting providers",
    after_help = "Commands:\n  discover                 List source repositories into the state file\n  plan                     Select work and split it into batches\n  run                      Migrate selected repositories (or one plan batch)\n  status                   Summarize migration progress\n  failed                   List failed repositories\n  reset --repo <name>      Return repositories to pending\n  merge <partial>...       Fold shard state files into the canonical state\n\nExamples:\n  rmig discover\n  rmig run --limit 20\n  rmig plan --discover --out plan.json\n  rmig run --plan plan.json --batch 2 --state state-2.json\n  rmig merge state-1.json state-2.json\n  rmig status --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

impl RootArgs {
    pub fn common(&self) -> &CommonArgs {
        match &self.command {
            Command::Discover(args) => &args.common,
            Command::Plan(args) => &args.common,
            Command::Run(args) => &args.common,
            Command::Status(args) => &args.common,
            Command::Failed(args) => &args.common,
            Command::Reset(args) => &args.common,
            Command::Merge(args) => &args.common,
        }
    }
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Discover(DiscoverArgs),
    Plan(PlanArgs),
    Run(RunArgs),
    Status(StatusArgs),
    Failed(FailedArgs),
    Reset(ResetArgs),
    Merge(MergeArgs),
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Migration config file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// State file (overrides `state_path` from the config)
    #[arg(long, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// Emit debug logs
    #[arg(long, short)]
    pub verbose: bool,
}

/// Selection overrides shared by `plan` and `run`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Maximum number of repositories to select
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Do not select completed repositories for resync
    #[arg(long)]
    pub no_sync: bool,

    /// Skip resyncs for sources unchanged in this many days (0 disables)
    #[arg(long, value_name = "DAYS")]
    pub inactive_days: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(about = "List source repositories and record them in the state file")]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Select work and write a batch plan for sharded runs")]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub select: SelectArgs,

    /// Plan output path
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PLAN_PATH)]
    pub out: PathBuf,

    /// Run discovery before selecting
    #[arg(long)]
    pub discover: bool,

    /// Repositories per batch (overrides `batch_size`)
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Batches to emit (overrides `max_batches_per_run`)
    #[arg(long, value_name = "N")]
    pub max_batches: Option<usize>,
}

#[derive(Parser, Debug)]
#[command(about = "Migrate selected repositories, checkpointing after each phase")]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub select: SelectArgs,

    /// Process one batch from a plan file instead of selecting (needs --state)
    #[arg(long, value_name = "PATH", requires_all = ["batch", "state"])]
    pub plan: Option<PathBuf>,

    /// Batch number within --plan (1-based)
    #[arg(long, value_name = "N", requires = "plan")]
    pub batch: Option<usize>,

    /// Process only these repositories (repeatable)
    #[arg(long = "repo", value_name = "NAME", conflicts_with = "plan")]
    pub repos: Vec<String>,

    /// Do not refresh the repository list before selecting
    #[arg(long)]
    pub skip_discovery: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize migration progress")]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List failed repositories with their errors")]
pub struct FailedArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Only list failures that will not be retried
    #[arg(long)]
    pub permanent: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Return repositories to pending so the next run retries them")]
pub struct ResetArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Repository to reset (repeatable)
    #[arg(long = "repo", value_name = "NAME", required = true)]
    pub repos: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Fold partial state files into the canonical state file")]
pub struct MergeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Partial state files, merged in order
    #[arg(value_name = "PARTIAL", required = true)]
    pub partials: Vec<PathBuf>,
}
