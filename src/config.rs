//! Migration configuration.
//!
//! The config file is JSON with a `schema_version`; it is loaded, validated,
//! and then adjusted by CLI overrides before any command touches state.
use crate::runner::RetryPolicy;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "rmig.json";
pub const DEFAULT_SOURCE_TOKEN_ENV: &str = "RMIG_SOURCE_TOKEN";
pub const DEFAULT_TARGET_TOKEN_ENV: &str = "RMIG_TARGET_TOKEN";

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_CLONE_URL_TEMPLATE: &str = "https://github.com/{org}/{name}.git";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_clone_url_template() -> String {
    DEFAULT_CLONE_URL_TEMPLATE.to_string()
}

fn default_source_token_env() -> String {
    DEFAULT_SOURCE_TOKEN_ENV.to_string()
}

fn default_target_token_env() -> String {
    DEFAULT_TARGET_TOKEN_ENV.to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("migration-state.json")
}

fn default_git_command() -> String {
    "git".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    10
}

fn default_max_parallel() -> usize {
    4
}

fn default_max_batches_per_run() -> usize {
    1
}

fn default_operation_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_http_timeout_secs() -> u64 {
    30
}

/// Source hosting provider.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub org: String,
    /// Environment variable holding the access token.
    #[serde(default = "default_source_token_env")]
    pub token_env: String,
    /// Clone URL with `{org}` and `{name}` placeholders.
    #[serde(default = "default_clone_url_template")]
    pub clone_url_template: String,
}

/// Target hosting provider.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub org: String,
    #[serde(default = "default_target_token_env")]
    pub token_env: String,
    #[serde(default = "default_clone_url_template")]
    pub clone_url_template: String,
    /// Visibility of repositories created on the target.
    #[serde(default = "default_true")]
    pub private: bool,
}

/// Root config file (`rmig.json`).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MigrateConfig {
    pub schema_version: u32,
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_git_command")]
    pub git_command: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_max_batches_per_run")]
    pub max_batches_per_run: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Skip resyncs for sources untouched for this many days; 0 disables.
    #[serde(default)]
    pub inactivity_cutoff_days: u32,
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    /// Retry ceiling for failed repositories; unset retries without bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_operation_attempts")]
    pub operation_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl MigrateConfig {
    /// Minimal config for the given organizations; every other field defaults.
    pub fn new(source_org: &str, target_org: &str) -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            source: SourceConfig {
                api_url: default_api_url(),
                org: source_org.to_string(),
                token_env: default_source_token_env(),
                clone_url_template: default_clone_url_template(),
            },
            target: TargetConfig {
                api_url: default_api_url(),
                org: target_org.to_string(),
                token_env: default_target_token_env(),
                clone_url_template: default_clone_url_template(),
                private: true,
            },
            state_path: default_state_path(),
            work_dir: None,
            git_command: default_git_command(),
            batch_size: default_batch_size(),
            max_parallel: default_max_parallel(),
            max_batches_per_run: default_max_batches_per_run(),
            include: Vec::new(),
            exclude: Vec::new(),
            inactivity_cutoff_days: 0,
            sync_enabled: true,
            max_attempts: None,
            operation_attempts: default_operation_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    /// Mirror directory; falls back to the platform data dir.
    pub fn resolved_work_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.work_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("rmig").join("mirrors"))
            .ok_or_else(|| anyhow!("no local data directory; set work_dir in the config"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.operation_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn filters(&self) -> Result<Filters> {
        Filters::new(&self.include, &self.exclude)
    }
}

/// Load and validate the config at `path`.
pub fn load_config(path: &Path) -> Result<MigrateConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: MigrateConfig =
        serde_json::from_slice(&bytes).context("parse migration config JSON")?;
    validate_config(&config).with_context(|| format!("validate config {}", path.display()))?;
    Ok(config)
}

/// Validate schema and value ranges.
pub fn validate_config(config: &MigrateConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.source.org.trim().is_empty() {
        return Err(anyhow!("source.org must be non-empty"));
    }
    if config.target.org.trim().is_empty() {
        return Err(anyhow!("target.org must be non-empty"));
    }
    for (label, template) in [
        ("source.clone_url_template", &config.source.clone_url_template),
        ("target.clone_url_template", &config.target.clone_url_template),
    ] {
        if !template.contains("{name}") {
            return Err(anyhow!("{label} must contain {{name}} (got {template:?})"));
        }
    }
    if config.batch_size == 0 {
        return Err(anyhow!("batch_size must be at least 1"));
    }
    if config.max_batches_per_run == 0 {
        return Err(anyhow!("max_batches_per_run must be at least 1"));
    }
    if config.operation_attempts == 0 {
        return Err(anyhow!("operation_attempts must be at least 1"));
    }
    if config.max_attempts == Some(0) {
        return Err(anyhow!("max_attempts must be at least 1 when set"));
    }
    if config.git_command.trim().is_empty() {
        return Err(anyhow!("git_command must be non-empty"));
    }
    config.filters()?;
    Ok(())
}

/// Read a token from the environment; empty values count as unset.
pub fn read_token(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Include/exclude name filters, matched against the full repository name.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl Filters {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_patterns(include, "include")?,
            exclude: compile_patterns(exclude, "exclude")?,
        })
    }

    /// An empty include list admits everything; exclusion always wins.
    pub fn allows(&self, name: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|re| re.is_match(name));
        included && !self.exclude.iter().any(|re| re.is_match(name))
    }
}

fn compile_patterns(patterns: &[String], label: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})$"))
                .with_context(|| format!("invalid {label} pattern {pattern:?}"))
        })
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
