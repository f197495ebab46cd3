//! Download module: concurrent, rate-limited, retrying batch fetching.
//!
//! This module provides:
//! - [`DownloadEngine`] - worker pool that runs a batch of [`WorkItem`]s
//! - [`RateLimiter`] - global token bucket shared by every worker
//! - [`FetchStrategy`] - pluggable transports ([`HttpClient`], [`LocalFileStrategy`])
//! - [`run_with_retry`] - bounded retries with linear backoff
//! - [`ProgressTracker`] and [`BatchReport`] - live counters and final summary
//! - [`DownloadError`] and [`FetchError`] - attempt-level and outcome-level errors

mod client;
pub mod constants;
mod engine;
mod error;
pub mod filename;
pub mod integrity;
mod item;
mod local;
mod progress;
pub mod rate_limiter;
mod report;
mod retry;
mod strategy;

pub use client::{HttpClient, default_user_agent};
pub use engine::{
    BatchHooks, DEFAULT_CONCURRENCY, DEFAULT_OUTPUT_DIR, DEFAULT_RATE_LIMIT, DownloadEngine,
    EngineConfig, EngineError, MAX_CONCURRENCY, MIN_CONCURRENCY, OverwritePolicy,
};
pub use error::{DownloadError, FetchError};
pub use filename::{destination_filename, sanitize_filename};
pub use integrity::{hash_file, verify_file};
pub use item::{FetchOutcome, OutcomeStatus, WorkItem};
pub use local::{LocalFileStrategy, local_source_path};
pub use progress::{ProgressSnapshot, ProgressTracker, ProgressUpdate, TransferMeter, TransferProgress};
pub use rate_limiter::{Cancelled, RateLimitError, RateLimiter};
pub use report::BatchReport;
pub use retry::{
    AttemptContext, DEFAULT_MAX_RETRIES, FailureType, MAX_RETRIES_LIMIT, RetryDecision,
    RetryPolicy, classify_error, run_with_retry,
};
pub use strategy::{FetchRequest, FetchStrategy, FetchedFile, StrategyRegistry};

/// Registry with the built-in strategies: HTTP(S) first, then local files.
#[must_use]
pub fn default_strategies(http: HttpClient) -> StrategyRegistry {
    StrategyRegistry::new().with(http).with(LocalFileStrategy::new())
}
