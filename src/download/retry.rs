//! Retry controller with linear, attempt-indexed backoff.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying attempt errors, and [`run_with_retry`], which drives the
//! attempts for one work item.
//!
//! # Overview
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on another attempt
//! - [`FailureType::Permanent`] - will not succeed regardless of retries
//! - [`FailureType::Cancelled`] - the batch was cancelled mid-attempt
//!
//! The [`RetryPolicy`] then decides whether another attempt is allowed. After
//! failed attempt `N` the controller waits `N * backoff_step` before trying
//! again, so with the default 1s step the waits are 1s, 2s, 3s, ...
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bulk_downloader::download::{
//!     DownloadError, FailureType, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let policy = RetryPolicy::new(3);
//! let error = DownloadError::unexpected_status("https://example.com/file.iso", 503);
//! let failure_type = classify_error(&error, policy.retry_on_status());
//!
//! assert_eq!(
//!     policy.should_retry(failure_type, 2),
//!     RetryDecision::Retry { delay: Duration::from_secs(2), attempt: 3 },
//! );
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::DEFAULT_BACKOFF_STEP;
use super::error::{DownloadError, FetchError};
use super::item::{FetchOutcome, WorkItem};
use super::progress::TransferProgress;
use super::rate_limiter::RateLimiter;
use super::strategy::{FetchRequest, FetchStrategy};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on configurable retries.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Classification of attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: connection refused, timeout, non-2xx status, disk errors.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: malformed URL, no strategy for the scheme.
    Permanent,

    /// The batch was cancelled while the attempt was in flight.
    Cancelled,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `max_retries`: 3 (so at most 4 attempts)
/// - `backoff_step`: 1 second
/// - `retry_on_status`: true
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    max_retries: u32,

    /// Wait after failed attempt N is `N * backoff_step`.
    backoff_step: Duration,

    /// Whether non-2xx responses are retried.
    retry_on_status: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries with the default step.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_step: DEFAULT_BACKOFF_STEP,
            retry_on_status: true,
        }
    }

    /// Overrides the backoff step.
    #[must_use]
    pub fn with_backoff_step(mut self, backoff_step: Duration) -> Self {
        self.backoff_step = backoff_step;
        self
    }

    /// Controls whether non-2xx responses are retried.
    #[must_use]
    pub fn with_retry_on_status(mut self, retry_on_status: bool) -> Self {
        self.retry_on_status = retry_on_status;
        self
    }

    /// Returns the configured retry count.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the maximum number of attempts (`max_retries + 1`).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the backoff step.
    #[must_use]
    pub fn backoff_step(&self) -> Duration {
        self.backoff_step
    }

    /// Returns whether non-2xx responses are retried.
    #[must_use]
    pub fn retry_on_status(&self) -> bool {
        self.retry_on_status
    }

    /// Returns the wait after failed attempt `attempt` (1-indexed).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts()))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Cancelled => {
                return RetryDecision::DoNotRetry {
                    reason: "batch cancelled".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, max = self.max_attempts(), "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts()),
            };
        }

        let delay = self.backoff_delay(attempt);
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies an attempt error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Network, Timeout | Transient |
/// | UnexpectedStatus | Transient, or Permanent when `retry_on_status` is false |
/// | Io | Transient |
/// | InvalidUrl, UnsupportedSource | Permanent |
/// | Cancelled | Cancelled |
#[must_use]
pub fn classify_error(error: &DownloadError, retry_on_status: bool) -> FailureType {
    match error {
        DownloadError::Network { .. } | DownloadError::Timeout { .. } | DownloadError::Io { .. } => {
            FailureType::Transient
        }
        DownloadError::UnexpectedStatus { .. } => {
            if retry_on_status {
                FailureType::Transient
            } else {
                FailureType::Permanent
            }
        }
        DownloadError::InvalidUrl { .. } | DownloadError::UnsupportedSource { .. } => {
            FailureType::Permanent
        }
        DownloadError::Cancelled { .. } => FailureType::Cancelled,
    }
}

/// Shared collaborators of every attempt in a batch.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    /// Global rate limiter; one token per attempt.
    pub limiter: &'a RateLimiter,
    /// Retry policy of the batch.
    pub policy: &'a RetryPolicy,
    /// Batch cancellation token.
    pub cancel: &'a CancellationToken,
    /// Byte-progress handle.
    pub progress: &'a TransferProgress,
}

/// Fetches one work item, retrying per the context's policy.
///
/// Every attempt, including the first, waits for a rate limiter token.
/// Always returns an outcome; errors are recorded in it rather than returned.
#[instrument(skip_all, fields(source = %item.id, strategy = strategy.name()))]
pub async fn run_with_retry(
    ctx: &AttemptContext<'_>,
    item: &WorkItem,
    strategy: &dyn FetchStrategy,
) -> FetchOutcome {
    let outcome = FetchOutcome::for_item(item);
    let request = FetchRequest {
        source_id: &item.id,
        destination: &item.destination,
        size_hint: item.size_hint,
        cancel: ctx.cancel,
        progress: ctx.progress,
    };

    let mut attempt: u32 = 1;
    loop {
        if ctx.limiter.acquire(ctx.cancel).await.is_err() {
            debug!(attempt, "cancelled while waiting for rate limiter");
            return outcome.with_failure(FetchError::RateLimitCancelled, attempt - 1);
        }

        let error = match strategy.fetch(&request).await {
            Ok(fetched) => {
                debug!(attempt, hash = %fetched.content_hash, "attempt succeeded");
                return outcome.with_success(fetched, attempt);
            }
            Err(error) => error,
        };

        let failure_type = classify_error(&error, ctx.policy.retry_on_status());
        match ctx.policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                info!(
                    attempt,
                    next_attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "attempt failed, retrying"
                );
                tokio::select! {
                    () = ctx.cancel.cancelled() => {
                        debug!(attempt, "cancelled during backoff");
                        return outcome.with_failure(FetchError::BatchCancelled, attempt);
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { reason } => {
                let kind = FetchError::from(&error);
                let final_error = match failure_type {
                    FailureType::Transient => FetchError::retries_exhausted(kind, attempt),
                    FailureType::Permanent | FailureType::Cancelled => kind,
                };
                if failure_type == FailureType::Cancelled {
                    debug!(attempt, "attempt cancelled");
                } else {
                    warn!(attempt, reason = %reason, error = %error, "giving up");
                }
                return outcome.with_failure(final_error, attempt);
            }
        }
    }
}
