//! Batch progress aggregation and advisory byte-level progress.
//!
//! [`ProgressTracker`] owns the only mutable live status of a batch. Workers
//! call [`ProgressTracker::report`] once per outcome; collaborators (CLI
//! progress bar, status endpoints) poll [`ProgressTracker::snapshot`].
//!
//! Byte-level progress is separate and lossy: each transfer gets a
//! [`TransferMeter`] that coalesces updates and forwards them with
//! `try_send`, so a slow subscriber can never stall a transfer.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{trace, warn};

use super::FetchOutcome;
use super::constants::PROGRESS_MIN_INTERVAL;

/// Point-in-time copy of batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Items that produced an outcome.
    pub completed: usize,
    /// Items in the batch.
    pub total: usize,
    /// Outcomes that succeeded (including skipped items).
    pub succeeded: usize,
    /// Outcomes that failed or were cancelled.
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Returns true once every item has produced an outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// Thread-safe batch counters, mutated under a single mutex.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
}

impl ProgressTracker {
    /// Creates a tracker for a batch of `total` items.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            state: Mutex::new(ProgressSnapshot {
                total,
                ..ProgressSnapshot::default()
            }),
        }
    }

    /// Records one terminal outcome.
    ///
    /// Reports beyond `total` are ignored so `completed` never overshoots.
    pub fn report(&self, outcome: &FetchOutcome) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.completed >= state.total {
            warn!(
                source = %outcome.work_item_id,
                total = state.total,
                "outcome reported after batch completion, ignoring"
            );
            return;
        }
        state.completed += 1;
        if outcome.succeeded {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }
    }

    /// Returns a consistent copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns true once every item has produced an outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.snapshot().is_finished()
    }
}

/// Advisory byte-level progress of one transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// Source identifier of the transfer.
    pub source_id: String,
    /// Bytes written so far.
    pub bytes: u64,
    /// Expected size, when known.
    pub total: Option<u64>,
    /// Percentage complete (0-100), when the size is known.
    pub percent: Option<u8>,
}

/// Cloneable handle that hands out per-transfer meters.
///
/// A default sender has no subscriber; meters created from it do nothing.
#[derive(Debug, Clone, Default)]
pub struct TransferProgress {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    min_interval: Duration,
}

impl TransferProgress {
    /// Wraps a bounded channel with the default 500 ms coalescing window.
    #[must_use]
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self::with_interval(tx, PROGRESS_MIN_INTERVAL)
    }

    /// Wraps a bounded channel with a custom coalescing window.
    #[must_use]
    pub fn with_interval(tx: mpsc::Sender<ProgressUpdate>, min_interval: Duration) -> Self {
        Self {
            tx: Some(tx),
            min_interval,
        }
    }

    /// A sender that discards every update.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Starts metering a transfer. `total` is the expected size, if known.
    #[must_use]
    pub fn meter(&self, source_id: &str, total: Option<u64>) -> TransferMeter {
        TransferMeter {
            tx: self.tx.clone(),
            source_id: source_id.to_string(),
            total: total.filter(|t| *t > 0),
            bytes: 0,
            last_emit: None,
            min_interval: self.min_interval,
        }
    }
}

/// Per-transfer progress state. Only emits when the size is known.
#[derive(Debug)]
pub struct TransferMeter {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    source_id: String,
    total: Option<u64>,
    bytes: u64,
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl TransferMeter {
    /// Records `delta` newly written bytes, emitting if the window has passed.
    pub fn advance(&mut self, delta: u64) {
        self.bytes = self.bytes.saturating_add(delta);
        let due = self
            .last_emit
            .is_none_or(|last| last.elapsed() >= self.min_interval);
        if due {
            self.emit();
        }
    }

    /// Emits a final update regardless of the coalescing window.
    pub fn finish(&mut self) {
        self.emit();
    }

    /// Bytes recorded so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn emit(&mut self) {
        let (Some(tx), Some(total)) = (&self.tx, self.total) else {
            return;
        };
        self.last_emit = Some(Instant::now());
        let update = ProgressUpdate {
            source_id: self.source_id.clone(),
            bytes: self.bytes,
            total: Some(total),
            percent: Some(percent_of(self.bytes, total)),
        };
        if tx.try_send(update).is_err() {
            trace!(source = %self.source_id, "progress subscriber busy, update dropped");
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent_of(bytes: u64, total: u64) -> u8 {
    let pct = u128::from(bytes.min(total)) * 100 / u128::from(total);
    pct as u8
}
