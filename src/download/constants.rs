//! Constants for the download module (timeouts, backoff, progress throttling).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default step of the linear retry backoff (attempt N waits N steps).
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Minimum spacing between two byte-progress updates of one transfer.
pub const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the lossy byte-progress channel created by [`BatchHooks::with_transfer_channel`].
///
/// [`BatchHooks::with_transfer_channel`]: super::BatchHooks::with_transfer_channel
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Suffix appended to the destination name while a transfer is in flight.
pub const PART_FILE_SUFFIX: &str = ".part";

/// Prefix of the hash-derived fallback filename.
pub const FALLBACK_FILENAME_PREFIX: &str = "downloaded_file_";

/// Read buffer size used by the local file strategy.
pub const LOCAL_COPY_CHUNK_SIZE: usize = 64 * 1024;
