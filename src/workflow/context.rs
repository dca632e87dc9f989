use crate::cli::{CommonArgs, SelectArgs};
use crate::config::{self, MigrateConfig};
use crate::remote::{
    GitMirror, GitMirrorConfig, HttpEndpoint, MigrateParams, SourceApi, TargetApi,
};
use crate::schedule::SelectOptions;
use crate::state::{MigrationState, StateStore};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Config plus resolved paths shared by every command.
pub(crate) struct MigrateContext {
    pub(crate) config: MigrateConfig,
    pub(crate) config_path: PathBuf,
    pub(crate) state_path: PathBuf,
}

impl MigrateContext {
    /// Load the config and resolve the state path.
    ///
    /// Relative paths inside the config resolve against the config file's
    /// directory; `--state` is taken as given.
    pub(crate) fn load(common: &CommonArgs) -> Result<Self> {
        let config = config::load_config(&common.config)?;
        let config_dir = common
            .config
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let state_path = match &common.state {
            Some(path) => path.clone(),
            None => config_dir.join(&config.state_path),
        };
        let mut config = config;
        if let Some(work_dir) = config.work_dir.take() {
            config.work_dir = Some(config_dir.join(work_dir));
        }
        tracing::debug!(
            config = %common.config.display(),
            state = %state_path.display(),
            "loaded migration config"
        );
        Ok(Self {
            config,
            config_path: common.config.clone(),
            state_path,
        })
    }

    /// Canonical state path from the config, ignoring any `--state` override.
    pub(crate) fn canonical_state_path(&self) -> PathBuf {
        let config_dir = self
            .config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config_dir.join(&self.config.state_path)
    }

    pub(crate) fn open_store(&self) -> StateStore {
        StateStore::load(
            &self.state_path,
            &self.config.source.org,
            &self.config.target.org,
        )
    }

    /// Read-only view of the state for reporting commands.
    pub(crate) fn inspect_state(&self) -> MigrationState {
        StateStore::inspect(
            &self.state_path,
            &self.config.source.org,
            &self.config.target.org,
        )
    }

    /// Selection knobs after applying CLI overrides.
    pub(crate) fn select_options(
        &self,
        select: &SelectArgs,
        default_limit: usize,
    ) -> SelectOptions {
        SelectOptions {
            max_count: select.limit.unwrap_or(default_limit),
            include_sync: self.config.sync_enabled && !select.no_sync,
            inactivity_cutoff_days: select
                .inactive_days
                .unwrap_or(self.config.inactivity_cutoff_days),
            max_attempts: self.config.max_attempts,
        }
    }

    pub(crate) fn source_api(&self) -> SourceApi {
        let source = &self.config.source;
        SourceApi::new(
            HttpEndpoint {
                api_url: source.api_url.clone(),
                org: source.org.clone(),
                token: config::read_token(&source.token_env),
            },
            self.config.http_timeout(),
        )
    }

    pub(crate) fn target_api(&self) -> TargetApi {
        let target = &self.config.target;
        TargetApi::new(
            HttpEndpoint {
                api_url: target.api_url.clone(),
                org: target.org.clone(),
                token: config::read_token(&target.token_env),
            },
            self.config.http_timeout(),
        )
    }

    pub(crate) fn git_mirror(&self) -> Result<GitMirror> {
        GitMirror::new(GitMirrorConfig {
            git_command: self.config.git_command.clone(),
            work_dir: self.config.resolved_work_dir()?,
            source_url_template: self.config.source.clone_url_template.clone(),
            target_url_template: self.config.target.clone_url_template.clone(),
            source_org: self.config.source.org.clone(),
            target_org: self.config.target.org.clone(),
            source_token: config::read_token(&self.config.source.token_env),
            target_token: config::read_token(&self.config.target.token_env),
        })
    }

    pub(crate) fn migrate_params(&self) -> MigrateParams {
        MigrateParams {
            source_org: self.config.source.org.clone(),
            private: self.config.target.private,
        }
    }
}
