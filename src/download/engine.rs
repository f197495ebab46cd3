//! Download engine: a fixed worker pool over a closed work queue.
//!
//! This module provides the [`DownloadEngine`] which plans source identifiers
//! into [`WorkItem`]s and runs a batch of them with bounded parallelism, a
//! global rate limit and per-item retries.
//!
//! # Concurrency Model
//!
//! - Exactly `concurrency` worker tasks are spawned per batch
//! - Workers pull from a shared bounded channel that is filled up front and
//!   closed, so no item is processed twice and none is dropped
//! - Every outcome goes through an unbounded channel to a single collecting
//!   reader that builds the [`BatchReport`]
//! - Cancellation stops new limiter acquisitions, aborts in-flight transfers,
//!   and drains queued items as [`FetchError::BatchCancelled`]
//!
//! # Example
//!
//! ```no_run
//! use bulk_downloader::download::{
//!     BatchHooks, DownloadEngine, EngineConfig, HttpClient, StrategyRegistry,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let strategies = StrategyRegistry::new().with(HttpClient::new()?);
//! let engine = DownloadEngine::new(EngineConfig::default(), strategies)?;
//! let items = engine.plan(["https://example.com/a.bin", "https://example.com/b.bin"]);
//! let report = engine.run(items, &CancellationToken::new(), BatchHooks::new()).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::PROGRESS_CHANNEL_CAPACITY;
use super::error::{DownloadError, FetchError};
use super::filename::destination_filename;
use super::integrity::hash_file;
use super::item::{FetchOutcome, WorkItem};
use super::progress::{ProgressTracker, ProgressUpdate, TransferProgress};
use super::rate_limiter::{RateLimitError, RateLimiter};
use super::report::BatchReport;
use super::retry::{AttemptContext, RetryPolicy, run_with_retry};
use super::strategy::StrategyRegistry;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default rate limit in transfer starts per second.
pub const DEFAULT_RATE_LIMIT: f64 = 5.0;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

/// Error type for batch setup. Per-item failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The rate limit could not be turned into a limiter.
    #[error(transparent)]
    InvalidRateLimit(#[from] RateLimitError),

    /// `run` was called with no work items.
    #[error("batch contains no work items")]
    EmptyBatch,

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// What to do when a destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Fetch again and atomically replace the file on success.
    #[default]
    Overwrite,
    /// Keep the file and report it as a skipped success.
    SkipExisting,
}

/// Batch configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory every destination lands in.
    pub output_dir: PathBuf,
    /// Number of workers (1-100).
    pub concurrency: usize,
    /// Transfer starts per second; `0` disables rate limiting.
    pub rate_limit: f64,
    /// Per-item retry policy.
    pub retry: RetryPolicy,
    /// Duplicate-file policy.
    pub overwrite: OverwritePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit: DEFAULT_RATE_LIMIT,
            retry: RetryPolicy::default(),
            overwrite: OverwritePolicy::default(),
        }
    }
}

/// Optional observers of a batch.
#[derive(Debug, Default)]
pub struct BatchHooks {
    outcomes: Option<mpsc::UnboundedSender<FetchOutcome>>,
    transfer: TransferProgress,
    tracker: Option<Arc<ProgressTracker>>,
}

impl BatchHooks {
    /// Hooks with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends a copy of every outcome to `tx` as it is produced.
    #[must_use]
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<FetchOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Forwards byte-level progress through `progress`.
    #[must_use]
    pub fn with_transfer_progress(mut self, progress: TransferProgress) -> Self {
        self.transfer = progress;
        self
    }

    /// Creates a lossy byte-progress channel and returns its receiver.
    #[must_use]
    pub fn with_transfer_channel(self) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        (self.with_transfer_progress(TransferProgress::new(tx)), rx)
    }

    /// Uses a caller-owned tracker so the batch can be polled while it runs.
    ///
    /// The tracker must be created with the number of items passed to
    /// [`DownloadEngine::run`]; otherwise a private tracker is used instead.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }
}

/// Concurrent, rate-limited, retrying batch downloader.
#[derive(Debug)]
pub struct DownloadEngine {
    config: EngineConfig,
    strategies: Arc<StrategyRegistry>,
    limiter: Arc<RateLimiter>,
}

impl DownloadEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100), and [`EngineError::InvalidRateLimit`] for a
    /// negative, non-finite or unrepresentably slow rate.
    #[instrument(level = "debug", skip_all, fields(concurrency = config.concurrency))]
    pub fn new(config: EngineConfig, strategies: StrategyRegistry) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }
        let limiter = RateLimiter::new(config.rate_limit)?;

        debug!(
            concurrency = config.concurrency,
            max_retries = config.retry.max_retries(),
            rate_limit = config.rate_limit,
            overwrite = ?config.overwrite,
            strategies = ?strategies,
            "creating download engine"
        );

        Ok(Self {
            config,
            strategies: Arc::new(strategies),
            limiter: Arc::new(limiter),
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Derives a work item per source, preserving input order.
    pub fn plan<I, S>(&self, sources: I) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                let id = source.into();
                let destination = self.config.output_dir.join(destination_filename(&id));
                WorkItem::new(id, index, destination)
            })
            .collect()
    }

    /// Runs a batch to completion and returns its report.
    ///
    /// Returns only after every item has exactly one outcome, including under
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyBatch`] for an empty item list and
    /// [`EngineError::OutputDir`] if the output directory cannot be created.
    /// Both are reported before any worker starts.
    #[instrument(skip_all, fields(items = items.len(), output_dir = %self.config.output_dir.display()))]
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        cancel: &CancellationToken,
        hooks: BatchHooks,
    ) -> Result<BatchReport, EngineError> {
        if items.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        prepare_output_dir(&self.config.output_dir).await?;

        let total = items.len();
        let tracker = match hooks.tracker {
            Some(tracker) if tracker.snapshot().total == total => tracker,
            Some(tracker) => {
                warn!(
                    expected = total,
                    actual = tracker.snapshot().total,
                    "progress tracker sized for a different batch, using a private one"
                );
                Arc::new(ProgressTracker::new(total))
            }
            None => Arc::new(ProgressTracker::new(total)),
        };

        let (work_tx, work_rx) = mpsc::channel(total);
        for item in &items {
            if work_tx.send(item.clone()).await.is_err() {
                break;
            }
        }
        drop(work_tx);

        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WorkerShared {
            queue: Mutex::new(work_rx),
            strategies: Arc::clone(&self.strategies),
            limiter: Arc::clone(&self.limiter),
            policy: self.config.retry.clone(),
            overwrite: self.config.overwrite,
            cancel: cancel.clone(),
            progress: hooks.transfer,
            reporter: Reporter::new(total, tracker, sink_tx, hooks.outcomes),
        });

        info!(
            total,
            concurrency = self.config.concurrency,
            "starting batch"
        );

        let handles: Vec<_> = (0..self.config.concurrency)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, Arc::clone(&shared))))
            .collect();

        let supervise = async move {
            let mut join_failure = None;
            for handle in handles {
                if let Err(join_error) = handle.await {
                    warn!(error = %join_error, "download worker terminated abnormally");
                    join_failure = Some(join_error.to_string());
                }
            }
            shared.report_missing(&items, join_failure.as_deref());
        };

        let (mut report, ()) = tokio::join!(BatchReport::collect(total, sink_rx), supervise);

        if cancel.is_cancelled() {
            report.mark_cancelled();
        }
        info!(
            total = report.total(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = report.cancelled(),
            "batch complete"
        );
        Ok(report)
    }
}

/// Creates the output directory and any missing parents.
async fn prepare_output_dir(path: &Path) -> Result<(), EngineError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);

    builder
        .create(path)
        .await
        .map_err(|source| EngineError::OutputDir {
            path: path.to_path_buf(),
            source,
        })
}

/// State shared by every worker of one batch.
struct WorkerShared {
    queue: Mutex<mpsc::Receiver<WorkItem>>,
    strategies: Arc<StrategyRegistry>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    overwrite: OverwritePolicy,
    cancel: CancellationToken,
    progress: TransferProgress,
    reporter: Reporter,
}

impl WorkerShared {
    async fn next_item(&self) -> Option<WorkItem> {
        self.queue.lock().await.recv().await
    }

    async fn process(&self, item: &WorkItem) -> FetchOutcome {
        if self.cancel.is_cancelled() {
            return FetchOutcome::for_item(item).with_failure(FetchError::BatchCancelled, 0);
        }

        if self.overwrite == OverwritePolicy::SkipExisting
            && let Some(outcome) = skip_existing(item).await
        {
            return outcome;
        }

        let Some(strategy) = self.strategies.select(&item.id) else {
            warn!(source = %item.id, "no fetch strategy accepts source");
            let error = DownloadError::unsupported_source(&item.id);
            return FetchOutcome::for_item(item).with_failure(FetchError::from(&error), 0);
        };

        let ctx = AttemptContext {
            limiter: &self.limiter,
            policy: &self.policy,
            cancel: &self.cancel,
            progress: &self.progress,
        };
        run_with_retry(&ctx, item, strategy).await
    }

    /// Reports every item that never produced an outcome.
    fn report_missing(&self, items: &[WorkItem], join_failure: Option<&str>) {
        let cancelled = self.cancel.is_cancelled();
        for item in items {
            if self.reporter.has_reported(item.index) {
                continue;
            }
            let error = if cancelled {
                FetchError::BatchCancelled
            } else {
                FetchError::TaskFailed {
                    message: join_failure
                        .unwrap_or("worker exited without reporting")
                        .to_string(),
                }
            };
            warn!(source = %item.id, error = %error, "item lost by its worker");
            self.reporter
                .report(FetchOutcome::for_item(item).with_failure(error, 0));
        }
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<WorkerShared>) {
    debug!(worker_id, "worker started");
    while let Some(item) = shared.next_item().await {
        let outcome = shared.process(&item).await;
        shared.reporter.report(outcome);
    }
    debug!(worker_id, "worker finished");
}

/// Hashes an existing destination so it can be reported as skipped.
async fn skip_existing(item: &WorkItem) -> Option<FetchOutcome> {
    let metadata = tokio::fs::metadata(&item.destination).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    match hash_file(&item.destination).await {
        Ok(hash) => {
            info!(source = %item.id, path = %item.destination.display(), "destination exists, skipping");
            Some(FetchOutcome::for_item(item).with_skip(hash, metadata.len()))
        }
        Err(error) => {
            warn!(source = %item.id, error = %error, "cannot hash existing destination, fetching again");
            None
        }
    }
}

/// Fans each outcome out to the tracker, the subscriber and the sink, once per item.
struct Reporter {
    tracker: Arc<ProgressTracker>,
    sink: mpsc::UnboundedSender<FetchOutcome>,
    subscriber: Option<mpsc::UnboundedSender<FetchOutcome>>,
    reported: std::sync::Mutex<Vec<bool>>,
}

impl Reporter {
    fn new(
        total: usize,
        tracker: Arc<ProgressTracker>,
        sink: mpsc::UnboundedSender<FetchOutcome>,
        subscriber: Option<mpsc::UnboundedSender<FetchOutcome>>,
    ) -> Self {
        Self {
            tracker,
            sink,
            subscriber,
            reported: std::sync::Mutex::new(vec![false; total]),
        }
    }

    fn has_reported(&self, index: usize) -> bool {
        self.reported
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(index)
            .copied()
            .unwrap_or(true)
    }

    fn report(&self, outcome: FetchOutcome) {
        {
            let mut reported = self
                .reported
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match reported.get_mut(outcome.index) {
                Some(seen) if !*seen => *seen = true,
                _ => {
                    warn!(source = %outcome.work_item_id, "duplicate outcome dropped");
                    return;
                }
            }
        }

        self.tracker.report(&outcome);
        if let Some(subscriber) = &self.subscriber
            && subscriber.send(outcome.clone()).is_err()
        {
            debug!("outcome subscriber gone");
        }
        if self.sink.send(outcome).is_err() {
            warn!("result sink closed before batch finished");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::download::strategy::{FetchRequest, FetchStrategy, FetchedFile, PartFile};

    /// Writes the source id as the body.
    struct EchoStrategy {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FetchStrategy for EchoStrategy {
        fn name(&self) -> &str {
            "echo"
        }

        fn can_handle(&self, source_id: &str) -> bool {
            source_id.starts_with("echo:///")
        }

        async fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedFile, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut part = PartFile::create(request.destination).await?;
            part.write_chunk(request.source_id.as_bytes()).await?;
            part.commit().await
        }
    }

    /// Panics on `panic://` sources.
    struct PanickingStrategy;

    #[async_trait]
    impl FetchStrategy for PanickingStrategy {
        fn name(&self) -> &str {
            "panicking"
        }

        fn can_handle(&self, source_id: &str) -> bool {
            source_id.starts_with("panic://")
        }

        async fn fetch(&self, _request: &FetchRequest<'_>) -> Result<FetchedFile, DownloadError> {
            panic!("strategy blew up");
        }
    }

    fn config(output_dir: &Path, concurrency: usize) -> EngineConfig {
        EngineConfig {
            output_dir: output_dir.to_path_buf(),
            concurrency,
            rate_limit: 0.0,
            retry: RetryPolicy::new(0),
            overwrite: OverwritePolicy::Overwrite,
        }
    }

    fn echo_engine(config: EngineConfig) -> (DownloadEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategies = StrategyRegistry::new()
            .with(EchoStrategy {
                calls: Arc::clone(&calls),
            })
            .with(PanickingStrategy);
        (DownloadEngine::new(config, strategies).unwrap(), calls)
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        let temp_dir = TempDir::new().unwrap();
        for concurrency in [1, 10, 100] {
            let (engine, _) = echo_engine(config(temp_dir.path(), concurrency));
            assert_eq!(engine.concurrency(), concurrency);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        for value in [0, 101] {
            let mut cfg = EngineConfig::default();
            cfg.concurrency = value;
            let result = DownloadEngine::new(cfg, StrategyRegistry::new());
            assert!(matches!(
                result,
                Err(EngineError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }

    #[test]
    fn test_engine_new_invalid_rate_limit() {
        let mut cfg = EngineConfig::default();
        cfg.rate_limit = -1.0;
        assert!(matches!(
            DownloadEngine::new(cfg, StrategyRegistry::new()),
            Err(EngineError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidConcurrency { value: 0 };
        assert!(error.to_string().contains("between 1 and 100"));
        assert!(EngineError::EmptyBatch.to_string().contains("no work items"));
    }

    #[test]
    fn test_engine_config_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.concurrency, DEFAULT_CONCURRENCY);
        assert!((cfg.rate_limit - DEFAULT_RATE_LIMIT).abs() < f64::EPSILON);
        assert_eq!(cfg.overwrite, OverwritePolicy::Overwrite);
        assert_eq!(cfg.output_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn test_plan_preserves_order_and_derives_destinations() {
        let (engine, _) = echo_engine(config(Path::new("/out"), 2));
        let items = engine.plan(["http://test/b.bin", "http://test/a.bin", "https://host/"]);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].index, 0);
        assert_eq!(items[0].destination, Path::new("/out/b.bin"));
        assert_eq!(items[1].destination, Path::new("/out/a.bin"));
        assert!(
            items[2]
                .destination
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("downloaded_file_")
        );
    }

    #[tokio::test]
    async fn test_run_empty_batch_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = echo_engine(config(temp_dir.path(), 2));
        let result = engine
            .run(Vec::new(), &CancellationToken::new(), BatchHooks::new())
            .await;
        assert!(matches!(result, Err(EngineError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_run_output_dir_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let (engine, calls) = echo_engine(config(&blocker.join("nested"), 2));

        let items = engine.plan(["echo:///a"]);
        let result = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await;

        assert!(matches!(result, Err(EngineError::OutputDir { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_creates_nested_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("a").join("b");
        let (engine, _) = echo_engine(config(&out, 2));

        let items = engine.plan(["echo:///one"]);
        let report = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(std::fs::read(out.join("one")).unwrap(), b"echo:///one");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&out).unwrap().permissions().mode();
            assert_eq!(mode & 0o777 & !0o755, 0, "mode {mode:o} wider than 0755");
        }
    }

    #[tokio::test]
    async fn test_run_processes_each_item_once() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, calls) = echo_engine(config(temp_dir.path(), 4));
        let sources: Vec<String> = (0..25).map(|i| format!("echo:///item{i}")).collect();

        let items = engine.plan(sources);
        let report = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes().len(), 25);
        assert_eq!(report.succeeded(), 25);
        assert_eq!(calls.load(Ordering::SeqCst), 25);
        let ordered = report.into_ordered();
        for (i, outcome) in ordered.iter().enumerate() {
            assert_eq!(outcome.index, i);
        }
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_invalid_source_without_retry() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = config(temp_dir.path(), 1);
        cfg.retry = RetryPolicy::new(3);
        let (engine, _) = echo_engine(cfg);

        let items = engine.plan(["gopher://host/file"]);
        let report = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await
            .unwrap();

        let outcome = &report.outcomes()[0];
        match &outcome.error {
            Some(FetchError::InvalidSource { message }) => {
                assert_eq!(
                    message,
                    "no fetch strategy accepts source: gopher://host/file"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn test_worker_panic_reports_task_failed() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = echo_engine(config(temp_dir.path(), 1));

        let items = engine.plan(["panic://boom", "echo:///after"]);
        let report = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes().len(), 2);
        let boom = report.outcome_for("panic://boom").unwrap();
        assert!(matches!(boom.error, Some(FetchError::TaskFailed { .. })));
        // The only worker died, so the queued item is lost too.
        let after = report.outcome_for("echo:///after").unwrap();
        assert!(matches!(after.error, Some(FetchError::TaskFailed { .. })));
    }

    #[tokio::test]
    async fn test_worker_panic_does_not_stop_other_workers() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = echo_engine(config(temp_dir.path(), 2));

        let mut sources = vec!["panic://boom".to_string()];
        sources.extend((0..10).map(|i| format!("echo:///ok{i}")));
        let items = engine.plan(sources);
        let report = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes().len(), 11);
        assert_eq!(report.succeeded(), 10);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_precancelled_batch_drains_as_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, calls) = echo_engine(config(temp_dir.path(), 3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items = engine.plan(["echo:///a", "echo:///b", "echo:///c", "echo:///d"]);
        let report = engine.run(items, &cancel, BatchHooks::new()).await.unwrap();

        assert_eq!(report.outcomes().len(), 4);
        assert_eq!(report.cancelled(), 4);
        assert!(report.was_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skip_existing_hashes_without_fetching() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("present"), b"kept").unwrap();
        let mut cfg = config(temp_dir.path(), 2);
        cfg.overwrite = OverwritePolicy::SkipExisting;
        let (engine, calls) = echo_engine(cfg);

        let items = engine.plan(["echo:///present", "echo:///absent"]);
        let report = engine
            .run(items, &CancellationToken::new(), BatchHooks::new())
            .await
            .unwrap();

        let present = report.outcome_for("echo:///present").unwrap();
        assert!(present.succeeded && present.skipped);
        assert_eq!(present.attempts, 0);
        assert_eq!(
            present.content_hash.as_deref(),
            Some(hash_file(&temp_dir.path().join("present")).await.unwrap().as_str())
        );
        assert_eq!(std::fs::read(temp_dir.path().join("present")).unwrap(), b"kept");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[tokio::test]
    async fn test_hooks_receive_outcomes_and_tracker_finishes() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = echo_engine(config(temp_dir.path(), 2));
        let items = engine.plan(["echo:///a", "echo:///b", "echo:///c"]);
        let tracker = Arc::new(ProgressTracker::new(items.len()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let hooks = BatchHooks::new()
            .with_outcomes(tx)
            .with_tracker(Arc::clone(&tracker));
        let report = engine
            .run(items, &CancellationToken::new(), hooks)
            .await
            .unwrap();

        let mut streamed = 0;
        while rx.recv().await.is_some() {
            streamed += 1;
        }
        assert_eq!(streamed, 3);
        assert!(tracker.is_finished());
        assert_eq!(tracker.snapshot().succeeded, report.succeeded());
    }

    #[tokio::test]
    async fn test_mid_batch_cancel_reports_every_item() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = config(temp_dir.path(), 2);
        cfg.rate_limit = 20.0;
        let (engine, _) = echo_engine(cfg);
        let sources: Vec<String> = (0..50).map(|i| format!("echo:///n{i}")).collect();
        let items = engine.plan(sources);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            trigger.cancel();
        });

        let report = engine.run(items, &cancel, BatchHooks::new()).await.unwrap();

        assert_eq!(report.outcomes().len(), 50);
        assert!(report.was_cancelled());
        assert!(report.cancelled() > 0);
        assert_eq!(report.succeeded() + report.failed(), 50);
    }
}
