//! Content sync via git mirror clones.
//!
//! Each repository keeps a bare mirror under the work directory. The first
//! sync clones it, later syncs fetch with pruning, and every sync ends with a
//! `push --mirror` to the target.
use super::{ContentSyncer, SyncOutcome};
use crate::classify::RemoteError;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Settings for [`GitMirror`].
#[derive(Debug, Clone)]
pub struct GitMirrorConfig {
    /// Git invocation, split with shell-words (e.g. `git -c http.postBuffer=524288000`).
    pub git_command: String,
    pub work_dir: PathBuf,
    pub source_url_template: String,
    pub target_url_template: String,
    pub source_org: String,
    pub target_org: String,
    pub source_token: Option<String>,
    pub target_token: Option<String>,
}

/// [`ContentSyncer`] backed by the local git binary.
#[derive(Debug)]
pub struct GitMirror {
    program: PathBuf,
    base_args: Vec<String>,
    config: GitMirrorConfig,
}

impl GitMirror {
    /// Resolve the git executable up front so a missing binary fails the run,
    /// not every repository.
    pub fn new(config: GitMirrorConfig) -> Result<Self> {
        let mut argv = shell_words::split(&config.git_command)
            .with_context(|| format!("parse git command: {}", config.git_command))?;
        if argv.is_empty() {
            return Err(anyhow!("git command is empty"));
        }
        let program_name = argv.remove(0);
        let program = which::which(&program_name)
            .with_context(|| format!("locate git executable {program_name:?}"))?;
        std::fs::create_dir_all(&config.work_dir)
            .with_context(|| format!("create {}", config.work_dir.display()))?;
        Ok(Self {
            program,
            base_args: argv,
            config,
        })
    }

    fn source_url(&self, name: &str) -> String {
        render_url(
            &self.config.source_url_template,
            &self.config.source_org,
            name,
            self.config.source_token.as_deref(),
        )
    }

    fn target_url(&self, name: &str) -> String {
        render_url(
            &self.config.target_url_template,
            &self.config.target_org,
            name,
            self.config.target_token.as_deref(),
        )
    }

    fn mirror_path(&self, name: &str) -> PathBuf {
        self.config.work_dir.join(format!("{name}.git"))
    }

    fn git(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String, RemoteError> {
        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command.args(&self.base_args);
        if let Some(cwd) = cwd {
            command.arg("-C").arg(cwd);
        }
        command.args(args).env("GIT_TERMINAL_PROMPT", "0");
        let output = command
            .output()
            .map_err(|err| RemoteError::Other(format!("spawn git: {err}")))?;
        tracing::debug!(
            subcommand = args.first().copied().unwrap_or_default(),
            elapsed_ms = start.elapsed().as_millis(),
            status = ?output.status.code(),
            "git invocation complete"
        );
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!(
                "git {} failed ({}): {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            );
            return Err(RemoteError::Other(self.redact(&message)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for token in [&self.config.source_token, &self.config.target_token]
            .into_iter()
            .flatten()
            .filter(|token| !token.is_empty())
        {
            redacted = redacted.replace(token.as_str(), "***");
        }
        redacted
    }
}

impl ContentSyncer for GitMirror {
    fn sync(&self, name: &str) -> Result<SyncOutcome, RemoteError> {
        let mirror = self.mirror_path(name);
        let source = self.source_url(name);
        if mirror.is_dir() {
            self.git(Some(&mirror), &["remote", "set-url", "origin", &source])?;
            self.git(Some(&mirror), &["remote", "update", "--prune"])?;
        } else {
            let mirror_arg = mirror.to_string_lossy().into_owned();
            self.git(None, &["clone", "--mirror", &source, &mirror_arg])?;
        }
        let target = self.target_url(name);
        self.git(Some(&mirror), &["push", "--mirror", &target])?;
        let refs = self.git(Some(&mirror), &["for-each-ref", "--format=%(refname)"])?;
        let items_processed = refs.lines().filter(|line| !line.trim().is_empty()).count();
        tracing::info!(repo = %name, refs = items_processed, "mirror pushed");
        Ok(SyncOutcome { items_processed })
    }
}

/// Fill `{org}` and `{name}` placeholders and embed a token for HTTPS URLs.
fn render_url(template: &str, org: &str, name: &str, token: Option<&str>) -> String {
    let url = template.replace("{org}", org).replace("{name}", name);
    match token {
        Some(token) if !token.is_empty() => match url.strip_prefix("https://") {
            Some(rest) => format!("https://x-access-token:{token}@{rest}"),
            None => url,
        },
        _ => url,
    }
}
