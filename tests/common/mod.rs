//! Shared test infrastructure for integration tests.
//!
//! Each test gets a scratch directory holding `rmig.json` and the state file;
//! commands run the built `rmig` binary with that directory as cwd.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// API base that refuses connections, so any network call fails fast.
pub const UNREACHABLE_API: &str = "http://127.0.0.1:9";

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    /// Scratch workspace with a config pointing at an unreachable API.
    pub fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let workspace = Self { dir };
        workspace.write_config(json!({}))?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `rmig.json`, overlaying `overrides` on the base config.
    pub fn write_config(&self, overrides: Value) -> anyhow::Result<()> {
        let mut config = json!({
            "schema_version": 1,
            "source": {
                "api_url": UNREACHABLE_API,
                "org": "acme",
                "clone_url_template": "http://127.0.0.1:9/{org}/{name}.git"
            },
            "target": {
                "api_url": UNREACHABLE_API,
                "org": "acme-new",
                "clone_url_template": "http://127.0.0.1:9/{org}/{name}.git"
            },
            "work_dir": "mirrors",
            "operation_attempts": 1,
            "retry_backoff_ms": 0,
            "http_timeout_secs": 5
        });
        if let (Some(base), Some(extra)) = (config.as_object_mut(), overrides.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        std::fs::write(
            self.path("rmig.json"),
            serde_json::to_string_pretty(&config)?,
        )?;
        Ok(())
    }

    /// Write a state file with the configured orgs and the given repos object.
    pub fn write_state(&self, rel: &str, repos: Value) -> anyhow::Result<()> {
        let state = json!({
            "version": 1,
            "sourceOrg": "acme",
            "targetOrg": "acme-new",
            "totalRepos": repos.as_object().map(|m| m.len()).unwrap_or(0),
            "repos": repos
        });
        std::fs::write(self.path(rel), serde_json::to_string_pretty(&state)?)?;
        Ok(())
    }

    pub fn read_json(&self, rel: &str) -> anyhow::Result<Value> {
        let text = std::fs::read_to_string(self.path(rel))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Run `rmig` with `args` inside the workspace.
    pub fn rmig(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_rmig"))
            .args(args)
            .current_dir(self.root())
            .env_remove("RUST_LOG")
            .env_remove("RMIG_SOURCE_TOKEN")
            .env_remove("RMIG_TARGET_TOKEN")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .expect("spawn rmig")
    }

    /// Run `rmig` and parse its stdout as JSON, asserting success.
    pub fn rmig_json(&self, args: &[&str]) -> Value {
        let output = self.rmig(args);
        assert!(
            output.status.success(),
            "rmig {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }
}

/// True (and logs) when git is not on PATH.
pub fn skip_if_git_missing() -> bool {
    let missing = Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_err();
    if missing {
        eprintln!("Skipping: git not available");
    }
    missing
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
