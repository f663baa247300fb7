//! Bounded retry for transient completion failures.
//!
//! Wraps any `CompletionProvider`. Rate limits and failed requests are
//! retried a small fixed number of times with jittered backoff; auth
//! failures and malformed responses are returned immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::error::CompletionError;
use crate::llm::{CompletionProvider, CompletionRequest};

/// Attempts per call, first try included.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff per attempt; a rate-limit hint overrides it.
const BASE_BACKOFF_MS: u64 = 500;

/// Upper bound on added jitter.
const JITTER_MS: u64 = 250;

/// Completion provider with bounded retry on transient failures.
pub struct RetryProvider {
    inner: Arc<dyn CompletionProvider>,
    max_attempts: u32,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn CompletionProvider>) -> Self {
        Self {
            inner,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Override the attempt cap.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Whether an error class is worth retrying.
fn is_transient(error: &CompletionError) -> bool {
    matches!(
        error,
        CompletionError::RequestFailed { .. } | CompletionError::RateLimited { .. }
    )
}

/// Delay before the next attempt. A rate-limit `retry_after` hint wins;
/// otherwise linear backoff plus jitter.
fn backoff_delay(attempt: u32, error: &CompletionError) -> Duration {
    if let CompletionError::RateLimited {
        retry_after: Some(after),
        ..
    } = error
    {
        return *after;
    }
    let jitter = rand::thread_rng().gen_range(0..=JITTER_MS);
    Duration::from_millis(BASE_BACKOFF_MS * u64::from(attempt) + jitter)
}

#[async_trait]
impl CompletionProvider for RetryProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    let delay = backoff_delay(attempt, &e);
                    warn!(
                        model = self.inner.model_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient completion failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
