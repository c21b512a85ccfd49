//! Retry wrapper for LLM providers.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use tandem_core::{Error, Result};

/// Wraps an LLM provider with a per-attempt timeout and retry logic.
///
/// Only retryable errors (transport failures and timeouts) are retried.
pub struct RetryWrapper {
    inner: Arc<dyn LlmProvider>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
}

impl RetryWrapper {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max attempts: 3 (including the first)
    /// - Initial delay: 1 second
    /// - Max delay: 10 seconds
    /// - Per-attempt timeout: 30 seconds
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            inner: provider,
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the maximum number of attempts, including the first.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the timeout for each attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Determines if an error should be retried.
    fn should_retry(error: &Error) -> bool {
        error.is_retryable()
    }

    async fn attempt(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::transport(format!(
                "{} did not respond within {:?}",
                self.inner.name(),
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl LlmProvider for RetryWrapper {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize);

        (|| async { self.attempt(request.clone()).await })
            .retry(backoff)
            .when(Self::should_retry)
            .notify(|err: &Error, dur: Duration| {
                tracing::warn!(provider = self.inner.name(), error = %err, delay = ?dur, "retrying completion");
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
