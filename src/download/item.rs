//! Work item and outcome types.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::error::FetchError;
use super::strategy::FetchedFile;

/// One source identifier paired with its destination.
///
/// Created by [`DownloadEngine::plan`](super::DownloadEngine::plan) and
/// consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Source URL or path, as given by the caller.
    pub id: String,
    /// Position in the input list.
    pub index: usize,
    /// Final destination path.
    pub destination: PathBuf,
    /// Expected size in bytes, when known up front.
    pub size_hint: Option<u64>,
}

impl WorkItem {
    /// Creates a work item with no size hint.
    pub fn new(id: impl Into<String>, index: usize, destination: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            index,
            destination: destination.into(),
            size_hint: None,
        }
    }

    /// Attaches an expected size.
    #[must_use]
    pub fn with_size_hint(mut self, size_hint: u64) -> Self {
        self.size_hint = Some(size_hint);
        self
    }
}

/// Coarse classification of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Fetched and written.
    Succeeded,
    /// Destination already existed and was kept.
    Skipped,
    /// Failed for a reason other than cancellation.
    Failed,
    /// Stopped by batch cancellation.
    Cancelled,
}

impl OutcomeStatus {
    /// Returns the lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal record for one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    /// Source identifier of the work item.
    pub work_item_id: String,
    /// Position of the work item in the input list.
    pub index: usize,
    /// Destination path (present on disk only when `succeeded`).
    pub local_path: PathBuf,
    /// Whether the destination holds the complete file.
    pub succeeded: bool,
    /// Whether an existing destination was kept instead of fetched.
    pub skipped: bool,
    /// Why the item failed.
    pub error: Option<FetchError>,
    /// Hex SHA-256 of the destination, when succeeded.
    pub content_hash: Option<String>,
    /// Bytes written (or found, for skipped items).
    pub bytes_transferred: u64,
    /// Fetch attempts made.
    pub attempts: u32,
}

impl FetchOutcome {
    /// Creates an outcome with no result recorded yet.
    pub fn new(work_item_id: impl Into<String>, index: usize, local_path: impl Into<PathBuf>) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            index,
            local_path: local_path.into(),
            succeeded: false,
            skipped: false,
            error: None,
            content_hash: None,
            bytes_transferred: 0,
            attempts: 0,
        }
    }

    /// Creates an empty outcome for `item`.
    #[must_use]
    pub fn for_item(item: &WorkItem) -> Self {
        Self::new(item.id.clone(), item.index, item.destination.clone())
    }

    /// Records a successful fetch.
    #[must_use]
    pub fn with_success(mut self, fetched: FetchedFile, attempts: u32) -> Self {
        self.succeeded = true;
        self.error = None;
        self.content_hash = Some(fetched.content_hash);
        self.bytes_transferred = fetched.bytes_written;
        self.attempts = attempts;
        self
    }

    /// Records an existing destination that was kept.
    #[must_use]
    pub fn with_skip(mut self, content_hash: String, bytes: u64) -> Self {
        self.succeeded = true;
        self.skipped = true;
        self.error = None;
        self.content_hash = Some(content_hash);
        self.bytes_transferred = bytes;
        self.attempts = 0;
        self
    }

    /// Records a terminal failure.
    #[must_use]
    pub fn with_failure(mut self, error: FetchError, attempts: u32) -> Self {
        self.succeeded = false;
        self.skipped = false;
        self.error = Some(error);
        self.content_hash = None;
        self.attempts = attempts;
        self
    }

    /// Classifies the outcome.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        match (&self.error, self.succeeded, self.skipped) {
            (_, true, true) => OutcomeStatus::Skipped,
            (_, true, false) => OutcomeStatus::Succeeded,
            (Some(error), false, _) if error.is_cancellation() => OutcomeStatus::Cancelled,
            _ => OutcomeStatus::Failed,
        }
    }
}
