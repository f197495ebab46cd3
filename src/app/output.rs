//! Final summary rendering.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use bulk_downloader::download::{BatchReport, FetchOutcome, OutcomeStatus};
use tracing::info;

pub(crate) fn print_completion_summary(report: &BatchReport, json: bool) -> Result<()> {
    info!(
        total = report.total(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        cancelled = report.was_cancelled(),
        "Download summary"
    );

    if json {
        let rendered =
            serde_json::to_string_pretty(report).context("failed to serialize report")?;
        println!("{rendered}");
    } else {
        print!("{}", render_summary(report));
    }
    Ok(())
}

/// One line per item in input order, then the totals.
pub(crate) fn render_summary(report: &BatchReport) -> String {
    let mut ordered: Vec<&FetchOutcome> = report.outcomes().iter().collect();
    ordered.sort_by_key(|outcome| outcome.index);

    let mut out = String::new();
    for outcome in ordered {
        let _ = writeln!(out, "{}", render_outcome_line(outcome));
    }
    let _ = writeln!(
        out,
        "Total: {}, Successful: {}, Failed: {}",
        report.total(),
        report.succeeded(),
        report.failed()
    );
    if report.skipped() > 0 {
        let _ = writeln!(out, "Skipped (already present): {}", report.skipped());
    }
    if report.was_cancelled() {
        let _ = writeln!(out, "Interrupted before the batch finished.");
    }
    out
}

fn render_outcome_line(outcome: &FetchOutcome) -> String {
    let hash = outcome.content_hash.as_deref().unwrap_or("-");
    match outcome.status() {
        OutcomeStatus::Succeeded => format!(
            "ok      {} -> {} (SHA256: {hash})",
            outcome.work_item_id,
            outcome.local_path.display()
        ),
        OutcomeStatus::Skipped => format!(
            "skipped {} -> {} (SHA256: {hash})",
            outcome.work_item_id,
            outcome.local_path.display()
        ),
        OutcomeStatus::Failed | OutcomeStatus::Cancelled => {
            let reason = outcome
                .error
                .as_ref()
                .map_or_else(|| "unknown error".to_string(), ToString::to_string);
            format!("FAILED  {}: {reason}", outcome.work_item_id)
        }
    }
}
