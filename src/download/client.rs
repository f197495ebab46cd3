//! HTTP fetch strategy.
//!
//! This module provides the `HttpClient` struct which streams a GET response
//! into the destination's part file with timeout configuration, status
//! checking and cleanup on error.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::strategy::{FetchRequest, FetchStrategy, FetchedFile, PartFile, run_guarded};

/// User-Agent sent with every request.
#[must_use]
pub fn default_user_agent() -> String {
    format!("bulk-downloader/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP(S) fetch strategy with streaming support.
///
/// This client is designed to be created once and reused for every item of a
/// batch, taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use bulk_downloader::download::{HttpClient, StrategyRegistry};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = StrategyRegistry::new().with(HttpClient::new()?);
/// assert!(registry.select("https://example.com/file.iso").is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Request timeout: 5 minutes (for large files)
    /// - Gzip decompression: enabled
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    #[instrument(level = "debug")]
    pub fn with_timeouts(connect_timeout: Duration, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    async fn transfer(
        &self,
        url: &Url,
        request: &FetchRequest<'_>,
        mut part: PartFile,
    ) -> Result<FetchedFile, DownloadError> {
        let response = self.send_request(url).await?;

        let total = response.content_length().or(request.size_hint);
        let mut meter = request.progress.meter(request.source_id, total);

        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| map_request_error(url.as_str(), e))?;
            part.write_chunk(&chunk).await?;
            meter.advance(chunk.len() as u64);
        }

        let fetched = part.commit().await?;
        meter.finish();
        Ok(fetched)
    }

    async fn send_request(&self, url: &Url) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| map_request_error(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "non-success status");
            return Err(DownloadError::unexpected_status(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl FetchStrategy for HttpClient {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, source_id: &str) -> bool {
        Url::parse(source_id).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
    }

    #[instrument(skip(self, request), fields(url = %request.source_id))]
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedFile, DownloadError> {
        let url = Url::parse(request.source_id)
            .map_err(|_| DownloadError::invalid_url(request.source_id))?;
        debug!(path = %request.destination.display(), "starting download");

        let fetched = run_guarded(request, |part| self.transfer(&url, request, part)).await?;
        info!(
            path = %request.destination.display(),
            bytes = fetched.bytes_written,
            "download complete"
        );
        Ok(fetched)
    }
}

fn map_request_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}
