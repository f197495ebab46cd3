//! Result sink: collects outcomes and renders the final summary.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::item::{FetchOutcome, OutcomeStatus};

/// All outcomes of a batch plus aggregate counters.
///
/// Built by a single collecting reader draining the outcome channel, so
/// `outcomes()` is in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    total: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    cancelled: usize,
    was_cancelled: bool,
    outcomes: Vec<FetchOutcome>,
}

impl BatchReport {
    /// Creates an empty report expecting `total` outcomes.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            outcomes: Vec::with_capacity(total),
            ..Self::default()
        }
    }

    /// Appends one outcome and updates the counters.
    pub fn record(&mut self, outcome: FetchOutcome) {
        match outcome.status() {
            OutcomeStatus::Succeeded => self.succeeded += 1,
            OutcomeStatus::Skipped => {
                self.succeeded += 1;
                self.skipped += 1;
            }
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Cancelled => {
                self.failed += 1;
                self.cancelled += 1;
            }
        }
        self.outcomes.push(outcome);
    }

    /// Marks the batch as cancelled by its caller.
    pub fn mark_cancelled(&mut self) {
        self.was_cancelled = true;
    }

    /// Number of work items in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Succeeded outcomes, including skipped ones.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Failed outcomes, including cancelled ones.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Outcomes whose destination already existed and was kept.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Outcomes stopped by batch cancellation.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }

    /// Whether the batch token fired before the batch finished.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.was_cancelled
    }

    /// Returns true when every item succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total && self.failed == 0
    }

    /// Outcomes in arrival order.
    #[must_use]
    pub fn outcomes(&self) -> &[FetchOutcome] {
        &self.outcomes
    }

    /// Failed outcomes in arrival order.
    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// Returns the outcome for a source identifier, if any.
    #[must_use]
    pub fn outcome_for(&self, work_item_id: &str) -> Option<&FetchOutcome> {
        self.outcomes.iter().find(|o| o.work_item_id == work_item_id)
    }

    /// Consumes the report, returning outcomes in input order.
    #[must_use]
    pub fn into_ordered(mut self) -> Vec<FetchOutcome> {
        self.outcomes.sort_by_key(|o| o.index);
        self.outcomes
    }

    /// Drains `rx` until every sender is gone.
    pub(crate) async fn collect(total: usize, mut rx: mpsc::UnboundedReceiver<FetchOutcome>) -> Self {
        let mut report = Self::new(total);
        while let Some(outcome) = rx.recv().await {
            debug!(
                source = %outcome.work_item_id,
                status = %outcome.status(),
                "outcome collected"
            );
            report.record(outcome);
        }
        report
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} succeeded, {} failed",
            self.total, self.succeeded, self.failed
        )?;
        if self.skipped > 0 {
            write!(f, " ({} skipped as already present)", self.skipped)?;
        }
        if self.was_cancelled {
            write!(f, " [cancelled]")?;
        }
        for outcome in self.failures() {
            write!(f, "\n  {}: ", outcome.work_item_id)?;
            match &outcome.error {
                Some(error) => write!(f, "{} ({error})", error.kind_label())?,
                None => write!(f, "unknown error")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::error::FetchError;
    use crate::download::strategy::FetchedFile;

    fn success(id: &str, index: usize) -> FetchOutcome {
        FetchOutcome::new(id, index, format!("/out/{index}")).with_success(
            FetchedFile {
                content_hash: "aa".repeat(32),
                bytes_written: 10,
            },
            1,
        )
    }

    fn failure(id: &str, index: usize, error: FetchError) -> FetchOutcome {
        FetchOutcome::new(id, index, format!("/out/{index}")).with_failure(error, 2)
    }

    #[test]
    fn test_counters() {
        let mut report = BatchReport::new(4);
        report.record(success("a", 0));
        report.record(FetchOutcome::new("s", 1, "/out/s").with_skip("bb".repeat(32), 3));
        report.record(failure("b", 2, FetchError::UnexpectedStatus { code: 404 }));
        report.record(failure("c", 3, FetchError::BatchCancelled));

        assert_eq!(report.total(), 4);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.cancelled(), 1);
        assert_eq!(report.failures().count(), 2);
        assert!(!report.all_succeeded());
        assert!(report.outcome_for("s").unwrap().skipped);
    }

    #[test]
    fn test_into_ordered_sorts_by_input_index() {
        let mut report = BatchReport::new(3);
        report.record(success("c", 2));
        report.record(success("a", 0));
        report.record(success("b", 1));

        let ids: Vec<_> = report
            .into_ordered()
            .into_iter()
            .map(|o| o.work_item_id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_display_names_failures_and_attempts() {
        let mut report = BatchReport::new(2);
        report.record(success("http://test/a.bin", 0));
        report.record(failure(
            "http://test/b.bin",
            1,
            FetchError::retries_exhausted(FetchError::UnexpectedStatus { code: 500 }, 2),
        ));

        let text = report.to_string();
        assert!(text.starts_with("2 total, 1 succeeded, 1 failed"), "{text}");
        assert!(text.contains("http://test/b.bin: retries_exhausted"), "{text}");
        assert!(text.contains("2 attempts"), "{text}");
        assert!(!text.contains("http://test/a.bin"), "{text}");
    }

    #[test]
    fn test_display_marks_cancellation() {
        let mut report = BatchReport::new(1);
        report.record(failure("x", 0, FetchError::BatchCancelled));
        report.mark_cancelled();
        assert!(report.to_string().contains("[cancelled]"));
    }

    #[test]
    fn test_serializes_counters_and_outcomes() {
        let mut report = BatchReport::new(1);
        report.record(success("a", 0));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["outcomes"][0]["work_item_id"], "a");
        assert_eq!(json["outcomes"][0]["error"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_collect_drains_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(success("a", 0)).unwrap();
        tx.send(failure("b", 1, FetchError::BatchCancelled)).unwrap();
        drop(tx);

        let report = BatchReport::collect(2, rx).await;
        assert_eq!(report.outcomes().len(), 2);
        assert_eq!(report.cancelled(), 1);
    }
}
