//! Global rate limiting of transfer starts.
//!
//! This module provides the [`RateLimiter`] struct, a token bucket with a
//! burst size of one shared by every worker of a batch. Successive admissions
//! are spaced at least `1 / rate` apart, so N admissions at rate R span at
//! least `(N - 1) / R` seconds.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bulk_downloader::download::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::new(5.0)?);
//! let cancel = CancellationToken::new();
//!
//! // First acquire proceeds immediately
//! limiter.acquire(&cancel).await?;
//!
//! // Second acquire waits 200ms for its slot
//! limiter.acquire(&cancel).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Returned by [`RateLimiter::acquire`] when the batch was cancelled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled while waiting for a rate limiter token")]
pub struct Cancelled;

/// Errors building a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RateLimitError {
    /// The rate is negative, NaN, infinite or too small to represent.
    #[error("invalid rate limit {rate}: must be a finite, non-negative number of starts per second")]
    InvalidRate {
        /// The rejected rate.
        rate: f64,
    },
}

/// Token-bucket rate limiter with burst size 1.
///
/// Designed to be wrapped in `Arc` and shared across worker tasks. The
/// schedule sits behind a `tokio::sync::Mutex` that is only held while a slot
/// is reserved, never across the wait.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between two admissions.
    interval: Duration,

    /// Whether rate limiting is disabled (for `--rate-limit 0`).
    disabled: bool,

    /// Earliest instant the next caller may be admitted.
    /// `None` until the first admission, which is immediate.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `per_second` starts per second.
    ///
    /// A rate of `0` yields a [disabled](Self::disabled) limiter.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidRate`] for negative or non-finite
    /// rates, and for rates so small the spacing overflows a `Duration` or
    /// pushes the next slot past the clock's range.
    #[instrument]
    pub fn new(per_second: f64) -> Result<Self, RateLimitError> {
        if !per_second.is_finite() || per_second < 0.0 {
            return Err(RateLimitError::InvalidRate { rate: per_second });
        }
        if per_second == 0.0 {
            return Ok(Self::disabled());
        }

        let interval = Duration::try_from_secs_f64(1.0 / per_second)
            .map_err(|_| RateLimitError::InvalidRate { rate: per_second })?;
        if Instant::now().checked_add(interval).is_none() {
            return Err(RateLimitError::InvalidRate { rate: per_second });
        }
        debug!(interval_ms = interval.as_millis(), "creating rate limiter");
        Ok(Self {
            interval,
            disabled: false,
            next_slot: Mutex::new(None),
        })
    }

    /// Creates a limiter that admits immediately but still honours
    /// cancellation.
    #[must_use]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            interval: Duration::ZERO,
            disabled: true,
            next_slot: Mutex::new(None),
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum spacing between admissions.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits for the next admission slot.
    ///
    /// The first call is admitted immediately. A wait interrupted by `cancel`
    /// gives its reserved slot back when no later caller reserved after it.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if `cancel` fires before the slot arrives, or was
    /// already cancelled on entry (no slot is reserved in that case).
    #[instrument(skip_all)]
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if self.disabled {
            return Ok(());
        }

        let slot = self.reserve().await;
        let wait = slot.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            return Ok(());
        }

        debug!(delay_ms = wait.as_millis(), "waiting for rate limit slot");
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.release(slot).await;
                debug!("rate limit wait cancelled");
                Err(Cancelled)
            }
            () = tokio::time::sleep_until(slot) => Ok(()),
        }
    }

    async fn reserve(&self) -> Instant {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        *next_slot = Some(self.after(slot));
        slot
    }

    async fn release(&self, slot: Instant) {
        let mut next_slot = self.next_slot.lock().await;
        if *next_slot == Some(self.after(slot)) {
            *next_slot = Some(slot);
        }
    }

    /// Slot following `slot`, pinned at `slot` once the clock's range runs out.
    fn after(&self, slot: Instant) -> Instant {
        slot.checked_add(self.interval).unwrap_or(slot)
    }
}
