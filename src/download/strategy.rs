//! Pluggable fetch strategies and the shared part-file pipeline.
//!
//! A [`FetchStrategy`] performs one attempt at moving the bytes of a source
//! into its destination. The [`StrategyRegistry`] picks the first registered
//! strategy that accepts an identifier, so the dispatcher never branches on
//! transport type.
//!
//! Every strategy writes through a [`PartFile`]: bytes go to `<name>.part`
//! and into a streaming SHA-256 accumulator in a single pass, and the part
//! file is renamed onto the destination only after a clean flush. A failed
//! or cancelled attempt removes the part file (see [`run_guarded`]).

use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::DownloadError;
use super::filename::part_path;
use super::progress::TransferProgress;

/// Everything a strategy needs for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Source identifier as given by the caller.
    pub source_id: &'a str,
    /// Final destination path.
    pub destination: &'a Path,
    /// Expected size, used for progress when the transport does not report one.
    pub size_hint: Option<u64>,
    /// Batch cancellation token; strategies abort promptly when it fires.
    pub cancel: &'a CancellationToken,
    /// Byte-progress handle for this batch.
    pub progress: &'a TransferProgress,
}

/// Result of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Hex-encoded SHA-256 of the bytes written.
    pub content_hash: String,
    /// Number of bytes written to the destination.
    pub bytes_written: u64,
}

/// Transport-specific retrieval routine.
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Box<dyn FetchStrategy>`. Rust 2024 native async traits are not
/// object-safe, so `async_trait` is required for the registry pattern.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Returns the strategy's name (e.g., "http", "local").
    fn name(&self) -> &str;

    /// Returns true if this strategy can fetch the given identifier.
    fn can_handle(&self, source_id: &str) -> bool;

    /// Performs one attempt.
    ///
    /// On success the destination holds the complete file. On error no
    /// partial output is left behind.
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedFile, DownloadError>;
}

/// Registration-ordered collection of strategies.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Registers a strategy after the existing ones.
    #[tracing::instrument(skip(self, strategy), fields(strategy_name))]
    pub fn register(&mut self, strategy: Box<dyn FetchStrategy>) {
        tracing::Span::current().record("strategy_name", strategy.name());
        debug!(name = strategy.name(), "registering fetch strategy");
        self.strategies.push(strategy);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, strategy: impl FetchStrategy + 'static) -> Self {
        self.register(Box::new(strategy));
        self
    }

    /// Returns the number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Returns the first strategy that accepts `source_id`.
    #[must_use]
    pub fn select(&self, source_id: &str) -> Option<&dyn FetchStrategy> {
        self.strategies
            .iter()
            .find(|s| s.can_handle(source_id))
            .map(AsRef::as_ref)
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("StrategyRegistry")
            .field("strategies", &names)
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight `<name>.part` file with a running SHA-256.
pub(crate) struct PartFile {
    part: PathBuf,
    destination: PathBuf,
    writer: BufWriter<File>,
    hasher: Sha256,
    bytes_written: u64,
}

impl PartFile {
    /// Creates (or truncates) the part file next to `destination`.
    pub(crate) async fn create(destination: &Path) -> Result<Self, DownloadError> {
        let part = part_path(destination);
        let file = File::create(&part)
            .await
            .map_err(|e| DownloadError::io(part.clone(), e))?;
        Ok(Self {
            part,
            destination: destination.to_path_buf(),
            writer: BufWriter::new(file),
            hasher: Sha256::new(),
            bytes_written: 0,
        })
    }

    pub(crate) async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(self.part.clone(), e))?;
        self.hasher.update(chunk);
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes, closes and renames the part file onto the destination.
    pub(crate) async fn commit(self) -> Result<FetchedFile, DownloadError> {
        let Self {
            part,
            destination,
            mut writer,
            hasher,
            bytes_written,
        } = self;

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(part.clone(), e))?;
        drop(writer);

        tokio::fs::rename(&part, &destination)
            .await
            .map_err(|e| DownloadError::io(destination.clone(), e))?;

        Ok(FetchedFile {
            content_hash: hex::encode(hasher.finalize()),
            bytes_written,
        })
    }
}

/// Runs one transfer under the batch token and cleans up on failure.
///
/// A token that already fired fails the attempt without starting it.
/// Otherwise the part file is created up front and handed to `transfer`,
/// so a cancelled attempt never abandons a create still running on the
/// blocking pool. The transfer is polled first, so one that already finished
/// is not reported as cancelled. Any error, including cancellation, removes
/// the part file before returning.
pub(crate) async fn run_guarded<F, Fut>(
    request: &FetchRequest<'_>,
    transfer: F,
) -> Result<FetchedFile, DownloadError>
where
    F: FnOnce(PartFile) -> Fut,
    Fut: Future<Output = Result<FetchedFile, DownloadError>> + Send,
{
    if request.cancel.is_cancelled() {
        return Err(DownloadError::cancelled(request.source_id));
    }

    let part = PartFile::create(request.destination).await?;

    let result = tokio::select! {
        biased;
        result = transfer(part) => result,
        () = request.cancel.cancelled() => Err(DownloadError::cancelled(request.source_id)),
    };

    if result.is_err() {
        remove_partial(&part_path(request.destination)).await;
    }
    result
}

async fn remove_partial(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => debug!(path = %part.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %part.display(), error = %e, "failed to remove partial file"),
    }
}
