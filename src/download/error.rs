//! Error types for the download module.
//!
//! Two layers are defined here:
//! - [`DownloadError`] is returned by a single fetch attempt and keeps the
//!   full context (URL, path, underlying `#[source]`).
//! - [`FetchError`] is the terminal error kind recorded in a
//!   [`FetchOutcome`](super::FetchOutcome). It is cloneable and serializable so
//!   outcomes can be fanned out to subscribers and printed as JSON.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during a single fetch attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} downloading {url}")]
    UnexpectedStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// No registered fetch strategy accepts this source identifier.
    #[error("no fetch strategy accepts source: {source_id}")]
    UnsupportedSource {
        /// The rejected source identifier.
        source_id: String,
    },

    /// The batch cancellation token fired while the attempt was in flight.
    #[error("download of {source_id} cancelled")]
    Cancelled {
        /// The source whose transfer was aborted.
        source_id: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an unexpected-status error.
    pub fn unexpected_status(url: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an unsupported-source error.
    pub fn unsupported_source(source_id: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            source_id: source_id.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(source_id: impl Into<String>) -> Self {
        Self::Cancelled {
            source_id: source_id.into(),
        }
    }

    /// Returns true if the attempt ended because the batch was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Terminal error kind of a work item, as recorded in its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// The batch was cancelled while the item waited for a rate limiter token.
    #[error("cancelled while waiting for a rate limiter token")]
    RateLimitCancelled,

    /// Connection, DNS, TLS or timeout failure.
    #[error("network error: {message}")]
    NetworkError {
        /// Rendered description of the underlying failure.
        message: String,
    },

    /// The server answered with a non-2xx status.
    #[error("unexpected HTTP status {code}")]
    UnexpectedStatus {
        /// The HTTP status code.
        code: u16,
    },

    /// Creating, writing or renaming the destination failed.
    #[error("filesystem error: {message}")]
    FilesystemError {
        /// Rendered description of the underlying failure.
        message: String,
    },

    /// Every allowed attempt failed.
    #[error("failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Error of the final attempt.
        last_error: Box<FetchError>,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The batch was cancelled before or while this item was processed.
    #[error("batch cancelled")]
    BatchCancelled,

    /// The source identifier cannot be fetched by any strategy.
    #[error("invalid source: {message}")]
    InvalidSource {
        /// Why the source was rejected.
        message: String,
    },

    /// The worker processing this item terminated abnormally.
    #[error("worker task failed: {message}")]
    TaskFailed {
        /// Join error description.
        message: String,
    },
}

impl FetchError {
    /// Wraps the error of the final attempt with the attempt count.
    #[must_use]
    pub fn retries_exhausted(last_error: FetchError, attempts: u32) -> Self {
        Self::RetriesExhausted {
            last_error: Box::new(last_error),
            attempts,
        }
    }

    /// Returns true for both cancellation kinds.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::RateLimitCancelled | Self::BatchCancelled)
    }

    /// Short stable label used in summaries and logs.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::RateLimitCancelled => "rate_limit_cancelled",
            Self::NetworkError { .. } => "network_error",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::FilesystemError { .. } => "filesystem_error",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::BatchCancelled => "batch_cancelled",
            Self::InvalidSource { .. } => "invalid_source",
            Self::TaskFailed { .. } => "task_failed",
        }
    }
}

impl From<&DownloadError> for FetchError {
    fn from(error: &DownloadError) -> Self {
        match error {
            DownloadError::Network { .. } | DownloadError::Timeout { .. } => Self::NetworkError {
                message: error.to_string(),
            },
            DownloadError::UnexpectedStatus { status, .. } => {
                Self::UnexpectedStatus { code: *status }
            }
            DownloadError::Io { .. } => Self::FilesystemError {
                message: error.to_string(),
            },
            DownloadError::InvalidUrl { .. } | DownloadError::UnsupportedSource { .. } => {
                Self::InvalidSource {
                    message: error.to_string(),
                }
            }
            DownloadError::Cancelled { .. } => Self::BatchCancelled,
        }
    }
}
