//! GitHub-compatible REST adapters for listing and API-level migration.
//!
//! Non-2xx responses are read rather than raised by the agent so the body can
//! inform classification (rate-limit 403s, "already exists" 422s).
use super::{ApiMigrator, MigrateParams, RemoteLister, RemoteRepo};
use crate::classify::RemoteError;
use crate::state::parse_timestamp;
use crate::util::truncate_string;
use serde::Deserialize;
use std::time::Duration;
use ureq::Agent;

const PAGE_SIZE: usize = 100;
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Base URL, organization, and credentials for one side of the migration.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    pub api_url: String,
    pub org: String,
    pub token: Option<String>,
}

impl HttpEndpoint {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", concat!("rmig/", env!("CARGO_PKG_VERSION")));
        match self.token.as_deref() {
            Some(token) => request.header("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

fn build_agent(timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    config.into()
}

/// Lists repositories of the source organization.
pub struct SourceApi {
    endpoint: HttpEndpoint,
    agent: Agent,
}

impl SourceApi {
    pub fn new(endpoint: HttpEndpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            agent: build_agent(timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoListing {
    name: String,
    #[serde(default)]
    pushed_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl RepoListing {
    fn into_remote(self) -> RemoteRepo {
        let last_modified = self
            .pushed_at
            .as_deref()
            .or(self.updated_at.as_deref())
            .and_then(|raw| match parse_timestamp(raw) {
                Ok(ts) => Some(ts),
                Err(err) => {
                    tracing::debug!(repo = %self.name, error = %err, "unparseable timestamp");
                    None
                }
            });
        RemoteRepo {
            name: self.name,
            last_modified,
        }
    }
}

impl RemoteLister for SourceApi {
    fn list(&self) -> Result<Vec<RemoteRepo>, RemoteError> {
        let mut repos = Vec::new();
        let mut page = 1usize;
        loop {
            let url = self.endpoint.url(&format!(
                "orgs/{}/repos?per_page={PAGE_SIZE}&page={page}",
                self.endpoint.org
            ));
            let mut response = self
                .endpoint
                .authorize(self.agent.get(&url))
                .call()
                .map_err(transport_error)?;
            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                let body = response.body_mut().read_to_string().unwrap_or_default();
                return Err(status_error(status, &body));
            }
            let listings: Vec<RepoListing> = response
                .body_mut()
                .read_json()
                .map_err(|err| RemoteError::Other(format!("parse repository listing: {err}")))?;
            let fetched = listings.len();
            repos.extend(listings.into_iter().map(RepoListing::into_remote));
            tracing::debug!(page, fetched, "listed source page");
            if fetched < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(repos)
    }
}

/// Creates repositories in the target organization.
pub struct TargetApi {
    endpoint: HttpEndpoint,
    agent: Agent,
}

impl TargetApi {
    pub fn new(endpoint: HttpEndpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            agent: build_agent(timeout),
        }
    }
}

impl ApiMigrator for TargetApi {
    fn exists(&self, name: &str) -> Result<bool, RemoteError> {
        let url = self
            .endpoint
            .url(&format!("repos/{}/{}", self.endpoint.org, name));
        let mut response = self
            .endpoint
            .authorize(self.agent.get(&url))
            .call()
            .map_err(transport_error)?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            status => {
                let body = response.body_mut().read_to_string().unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }

    fn migrate(&self, name: &str, params: &MigrateParams) -> Result<(), RemoteError> {
        let url = self.endpoint.url(&format!("orgs/{}/repos", self.endpoint.org));
        let body = serde_json::json!({
            "name": name,
            "private": params.private,
            "description": format!("Migrated from {}/{}", params.source_org, name),
        });
        let mut response = self
            .endpoint
            .authorize(self.agent.post(&url))
            .send_json(&body)
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Err(status_error(status, &body))
    }
}

fn transport_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::StatusCode(status) => status_error(status, ""),
        other => RemoteError::Transport(other.to_string()),
    }
}

/// Map an HTTP status (and body) onto a structured failure.
pub(crate) fn status_error(status: u16, body: &str) -> RemoteError {
    let body = truncate_string(body.trim(), MAX_ERROR_BODY_BYTES);
    let lower = body.to_lowercase();
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    match status {
        429 => RemoteError::RateLimited(message),
        403 if lower.contains("rate limit") => RemoteError::RateLimited(message),
        401 | 403 => RemoteError::Unauthorized(message),
        404 => RemoteError::NotFound(message),
        409 => RemoteError::Conflict(message),
        422 if lower.contains("already exists") => RemoteError::Conflict(message),
        _ => RemoteError::Other(message),
    }
}
