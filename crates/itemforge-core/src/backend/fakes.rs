//! In-memory backends (testing and demos).
//!
//! Provides `ScriptedBackend`, which replays a fixed queue of replies, and
//! `FnBackend`, which routes each request through a closure. Both record every
//! call so tests can assert on how often and with what the pipeline asked.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BackendError, BackendResult, GenerativeBackend};

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Replays queued replies in FIFO order.
///
/// Once the queue is empty the fallback reply is returned, or
/// `BackendError::Unavailable` when no fallback was set.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<BackendResult<String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<BackendResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor for a queue of successful replies.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push(&self, reply: BackendResult<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn complete(&self, system: &str, user: &str) -> BackendResult<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| BackendError::Unavailable("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// FnBackend
// ---------------------------------------------------------------------------

/// Routes each request through a closure `(system, user) -> reply`.
///
/// Useful when concurrent tasks interleave and the reply must depend on what
/// was asked rather than on arrival order.
pub struct FnBackend<F> {
    responder: F,
    calls: Mutex<Vec<RecordedCall>>,
}

impl<F> FnBackend<F>
where
    F: Fn(&str, &str) -> BackendResult<String> + Send + Sync,
{
    pub fn new(responder: F) -> Self {
        Self {
            responder,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> GenerativeBackend for FnBackend<F>
where
    F: Fn(&str, &str) -> BackendResult<String> + Send + Sync,
{
    async fn complete(&self, system: &str, user: &str) -> BackendResult<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        (self.responder)(system, user)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_backend_replays_then_falls_back() {
        let backend = ScriptedBackend::from_texts(["one"]).with_fallback("rest");
        assert_eq!(backend.complete("s", "u").await.unwrap(), "one");
        assert_eq!(backend.complete("s", "u").await.unwrap(), "rest");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_backend_exhausted_errors() {
        let backend = ScriptedBackend::default();
        assert!(matches!(
            backend.complete("s", "u").await,
            Err(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_fn_backend_routes_on_prompt() {
        let backend = FnBackend::new(|_system: &str, user: &str| {
            Ok(if user.contains("ping") { "pong" } else { "?" }.to_string())
        });
        assert_eq!(backend.complete("", "ping").await.unwrap(), "pong");
        assert_eq!(backend.calls()[0].user, "ping");
    }
}
