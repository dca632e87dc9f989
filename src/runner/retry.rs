//! Per-operation retries for remote calls.
//!
//! Retries are scoped to a single call (one API request, one git sync), never
//! to a whole phase. Only transient failures are retried here; everything
//! else goes straight back to the phase runner for classification.
use crate::classify::RemoteError;
use crate::state::ErrorType;
use std::thread;
use std::time::Duration;

/// Attempt bound and linear backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Run `op` up to `policy.attempts` times while it fails transiently.
pub fn with_retries<T>(
    policy: &RetryPolicy,
    operation: &str,
    repo: &str,
    mut op: impl FnMut() -> Result<T, RemoteError>,
) -> Result<T, RemoteError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && err.retry_class() == ErrorType::Transient => {
                let delay = policy.backoff * attempt;
                tracing::warn!(
                    operation,
                    repo,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure; retrying"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
