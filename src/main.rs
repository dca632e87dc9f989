//! `rmig`: resumable repository migration between hosting providers.
//!
//! Exit status is 0 when every processed repository succeeded, 1 when a run
//! recorded failures, and 2 when the command itself could not complete.
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod classify;
mod cli;
mod config;
mod remote;
mod runner;
mod schedule;
mod state;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.common().verbose);
    match dispatch(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn dispatch(args: RootArgs) -> anyhow::Result<ExitCode> {
    match args.command {
        Command::Discover(args) => workflow::run_discover(args)?,
        Command::Plan(args) => workflow::run_plan(args)?,
        Command::Run(args) => {
            let summary = workflow::run_run(args)?;
            if !summary.all_succeeded() {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Status(args) => workflow::run_status(args)?,
        Command::Failed(args) => workflow::run_failed(args)?,
        Command::Reset(args) => workflow::run_reset(args)?,
        Command::Merge(args) => workflow::run_merge(args)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so `--json` output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("rmig=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rmig=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
