//! Retry with exponential backoff
//!
//! `RetryingFetcher` wraps any `PageFetcher` and re-issues a fetch while the
//! failure is transient and retries remain. Terminal failures pass straight
//! through. Every retry is counted in the shared statistics. Once shutdown is
//! requested no further attempt is issued and the last failure is returned.

use super::fetcher::{FetchResult, PageFetcher};
use crate::state::SharedStatistics;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay before the first retry; doubles for each one after it
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(300);

/// How many times, and how patiently, transient failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff base
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Overrides the backoff base
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Delay before the given retry (1-based): `base * 2^(retry - 1)`
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exponent)
    }

    /// Returns true if a result with `retries_done` retries behind it should be retried
    pub fn should_retry(&self, result: &FetchResult, retries_done: u32) -> bool {
        match result.error {
            Some(error) => error.is_transient() && retries_done < self.max_retries,
            None => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Decorates a fetcher with the retry policy
#[derive(Debug, Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
    statistics: SharedStatistics,
    cancel: CancellationToken,
}

impl<F: PageFetcher> RetryingFetcher<F> {
    pub fn new(
        inner: F,
        policy: RetryPolicy,
        statistics: SharedStatistics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            policy,
            statistics,
            cancel,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Unwraps the single-attempt fetcher
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: PageFetcher> PageFetcher for RetryingFetcher<F> {
    async fn fetch(&self, identifier: &str) -> FetchResult {
        let mut result = self.inner.fetch(identifier).await;
        let mut retries = 0;

        while self.policy.should_retry(&result, retries) {
            if self.cancel.is_cancelled() {
                debug!(url = %identifier, "Not retrying, shutdown requested");
                return result;
            }

            retries += 1;
            let delay = self.policy.backoff(retries);
            debug!(
                url = %identifier,
                error = ?result.error,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying after transient failure"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(url = %identifier, "Backoff cut short, shutdown requested");
                    return result;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            self.statistics.record_retry();
            result = self.inner.fetch(identifier).await;
        }

        if let Some(error) = result.error {
            if error.is_transient() {
                warn!(url = %identifier, error = %error, retries, "Retries exhausted");
            }
        }

        result
    }
}
