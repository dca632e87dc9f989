//! Failure classification for retry eligibility.
//!
//! Collaborators report failures as a structured [`RemoteError`]. Structured
//! variants map straight to a retry class; only opaque `Other` messages fall
//! back to substring matching in [`classify_message`].
use crate::state::ErrorType;
use thiserror::Error;

/// Failure reported by a remote collaborator (API, lister, or git).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn retry_class(&self) -> ErrorType {
        classify(self)
    }
}

const TRANSIENT_MARKERS: [&str; 8] = [
    "rate limit",
    "timeout",
    "connection reset",
    "not found [dns]",
    "network",
    "502",
    "503",
    "504",
];
const RECOVERABLE_MARKERS: [&str; 3] = ["already exists", "409", "conflict"];
const PERMANENT_MARKERS: [&str; 6] = [
    "not found",
    "404",
    "forbidden",
    "403",
    "unauthorized",
    "401",
];

/// Classify free-form failure text.
///
/// Rules are checked in order and the first match wins. Network phrases come
/// before the generic "not found" so DNS failures stay transient. Anything
/// unrecognized is transient.
pub fn classify_message(message: &str) -> ErrorType {
    let lower = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| lower.contains(marker));
    if contains_any(&TRANSIENT_MARKERS) {
        ErrorType::Transient
    } else if contains_any(&RECOVERABLE_MARKERS) {
        ErrorType::Recoverable
    } else if contains_any(&PERMANENT_MARKERS) {
        ErrorType::Permanent
    } else {
        ErrorType::Transient
    }
}

/// Classify a structured collaborator failure.
pub fn classify(error: &RemoteError) -> ErrorType {
    match error {
        RemoteError::RateLimited(_) | RemoteError::Transport(_) => ErrorType::Transient,
        RemoteError::Conflict(_) => ErrorType::Recoverable,
        RemoteError::NotFound(_) | RemoteError::Unauthorized(_) => ErrorType::Permanent,
        RemoteError::Other(raw) => classify_message(raw),
    }
}

/// Whether a migrate failure means the target already has the repository.
///
/// Only this kind of conflict counts as success for the API phase; other
/// recoverable failures are recorded and retried.
pub fn is_already_exists(error: &RemoteError) -> bool {
    match error {
        RemoteError::Conflict(_) => true,
        RemoteError::Other(raw) => {
            let lower = raw.to_lowercase();
            lower.contains("already exists") || lower.contains("409")
        }
        _ => false,
    }
}
