//! Local filesystem fetch strategy.
//!
//! Copies `file://` URLs and bare paths through the same hashing and
//! part-file pipeline as the HTTP strategy.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::LOCAL_COPY_CHUNK_SIZE;
use super::error::DownloadError;
use super::strategy::{FetchRequest, FetchStrategy, FetchedFile, PartFile, run_guarded};

/// Fetch strategy for files reachable through the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStrategy;

impl LocalFileStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn transfer(
        source: PathBuf,
        request: &FetchRequest<'_>,
        mut part: PartFile,
    ) -> Result<FetchedFile, DownloadError> {
        let mut file = File::open(&source)
            .await
            .map_err(|e| DownloadError::io(source.clone(), e))?;
        let total = file
            .metadata()
            .await
            .ok()
            .map(|m| m.len())
            .or(request.size_hint);

        let mut meter = request.progress.meter(request.source_id, total);
        let mut buf = vec![0u8; LOCAL_COPY_CHUNK_SIZE];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| DownloadError::io(source.clone(), e))?;
            if n == 0 {
                break;
            }
            part.write_chunk(&buf[..n]).await?;
            meter.advance(n as u64);
        }

        let fetched = part.commit().await?;
        meter.finish();
        Ok(fetched)
    }
}

/// Resolves a `file://` URL or bare path to a filesystem path.
///
/// Returns `None` for identifiers with any other scheme.
#[must_use]
pub fn local_source_path(source_id: &str) -> Option<PathBuf> {
    if source_id.trim().is_empty() {
        return None;
    }
    match Url::parse(source_id) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() == 1 => Some(PathBuf::from(source_id)),
        Ok(_) => None,
        Err(_) => Some(PathBuf::from(source_id)),
    }
}

#[async_trait]
impl FetchStrategy for LocalFileStrategy {
    fn name(&self) -> &str {
        "local"
    }

    fn can_handle(&self, source_id: &str) -> bool {
        if source_id.trim().is_empty() {
            return false;
        }
        match Url::parse(source_id) {
            Ok(url) => url.scheme() == "file" || url.scheme().len() == 1,
            Err(_) => true,
        }
    }

    #[instrument(skip(self, request), fields(source = %request.source_id))]
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedFile, DownloadError> {
        let source = local_source_path(request.source_id)
            .ok_or_else(|| DownloadError::invalid_url(request.source_id))?;
        debug!(from = %source.display(), to = %request.destination.display(), "copying local file");

        let fetched = run_guarded(request, |part| Self::transfer(source, request, part)).await?;
        info!(
            path = %request.destination.display(),
            bytes = fetched.bytes_written,
            "copy complete"
        );
        Ok(fetched)
    }
}
