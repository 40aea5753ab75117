//! Generative backend port.
//!
//! The pipeline only ever sees `complete(system, user) -> text`. Nothing about
//! the reply is trusted: it may be empty, truncated or garbage, and the call
//! itself may fail. Transient failures are retried here with bounded,
//! increasing backoff. Everything else is the caller's problem.
//!
//! # Module layout
//!
//! - [`http`]: `HttpBackend`, an OpenAI-compatible chat completions client
//! - [`fakes`]: `ScriptedBackend`, `FnBackend` for tests and demos

pub mod fakes;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Errors surfaced by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("backend returned an empty response")]
    EmptyResponse,

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("backend misconfigured: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Unavailable(_) | BackendError::Timeout | BackendError::EmptyResponse => {
                true
            }
            BackendError::Http { status, .. } => *status == 429 || *status >= 500,
            BackendError::Decode(_) | BackendError::Config(_) => false,
        }
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A request/response text completion service.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Complete `user` under the `system` framing and return raw text.
    async fn complete(&self, system: &str, user: &str) -> BackendResult<String>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "backend"
    }
}

/// Bounded retry with exponential backoff, applied at every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Useful for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Call `backend` with bounded retry.
///
/// Retryable errors back off and try again until `policy.max_attempts` is
/// spent; the last error is then returned. Non-retryable errors return at once.
pub async fn complete_with_retry(
    backend: &dyn GenerativeBackend,
    policy: &RetryPolicy,
    system: &str,
    user: &str,
) -> BackendResult<String> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match backend.complete(system, user).await {
            Ok(text) if text.trim().is_empty() => {
                if attempt >= attempts {
                    return Err(BackendError::EmptyResponse);
                }
                debug!(backend = backend.name(), attempt, "empty completion, retrying");
            }
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(backend = backend.name(), attempt, error = %e, "backend call failed, retrying");
            }
            Err(e) => return Err(e),
        }

        let delay = policy.backoff_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::ScriptedBackend;
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Timeout.is_retryable());
        assert!(BackendError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Http {
            status: 401,
            body: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Config("no key".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Timeout),
            Ok("   ".to_string()),
            Ok("done".to_string()),
        ]);
        let out = complete_with_retry(&backend, &RetryPolicy::immediate(3), "s", "u")
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Unavailable("down".to_string())),
            Err(BackendError::Unavailable("down".to_string())),
            Ok("too late".to_string()),
        ]);
        let err = complete_with_retry(&backend, &RetryPolicy::immediate(2), "s", "u")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Unavailable("down".to_string()));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Config("missing key".to_string())),
            Ok("unused".to_string()),
        ]);
        let err = complete_with_retry(&backend, &RetryPolicy::immediate(5), "s", "u")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Timeout), Ok("ok".to_string())]);
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
        };
        let started = tokio::time::Instant::now();
        let out = complete_with_retry(&backend, &policy, "s", "u").await.unwrap();
        assert_eq!(out, "ok");
        assert!(started.elapsed() >= Duration::from_millis(5_000));
    }
}
