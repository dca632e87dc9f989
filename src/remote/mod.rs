//! Collaborator contracts for the source and target hosting providers.
//!
//! The migration core only depends on these traits. The bundled adapters talk
//! to GitHub-compatible REST APIs (`http`) and move content with git mirror
//! clones (`git`).
use crate::classify::RemoteError;
use chrono::{DateTime, Utc};

mod git;
mod http;

pub use git::{GitMirror, GitMirrorConfig};
pub use http::{HttpEndpoint, SourceApi, TargetApi};

/// A repository as enumerated on the source side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Parameters for creating the repository on the target side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateParams {
    pub source_org: String,
    pub private: bool,
}

/// Result of a successful content sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    pub items_processed: usize,
}

/// Enumerates repositories on the source.
pub trait RemoteLister {
    fn list(&self) -> Result<Vec<RemoteRepo>, RemoteError>;
}

/// API-level migration on the target (repository creation and metadata).
pub trait ApiMigrator {
    fn exists(&self, name: &str) -> Result<bool, RemoteError>;
    fn migrate(&self, name: &str, params: &MigrateParams) -> Result<(), RemoteError>;
}

/// Content (branches, tags) transfer from source to target.
pub trait ContentSyncer {
    fn sync(&self, name: &str) -> Result<SyncOutcome, RemoteError>;
}
