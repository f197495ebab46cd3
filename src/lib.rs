//! Bulk Downloader Core Library
//!
//! Fetches a list of source identifiers (HTTP(S) URLs or local paths) into an
//! output directory with bounded parallelism, a global rate limit, per-item
//! retries with linear backoff, and streaming SHA-256 verification.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - worker pool, rate limiter, fetch strategies, retries, reporting
//! - [`input`] - source-list parsing and local directory walking
//! - [`config`] - optional TOML configuration merged under CLI flags

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod input;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig};
pub use download::{
    BatchHooks, BatchReport, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadEngine,
    DownloadError, EngineConfig, EngineError, FetchError, FetchOutcome, FetchStrategy,
    HttpClient, OverwritePolicy, RateLimiter, RetryPolicy, StrategyRegistry, WorkItem,
};
pub use input::{InputError, parse_sources};
