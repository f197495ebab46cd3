//! Maps a finished batch to the process exit status.

use std::process::ExitCode;

use bulk_downloader::download::BatchReport;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every item succeeded, or there was nothing to do.
    Success,
    /// At least one item failed or the batch was cancelled.
    Failure,
    /// Setup failed before any transfer started.
    Fatal,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Fatal => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

pub(crate) fn determine_exit_outcome(report: &BatchReport) -> ProcessExit {
    if report.was_cancelled() || report.failed() > 0 {
        ProcessExit::Failure
    } else {
        ProcessExit::Success
    }
}

#[cfg(test)]
mod tests {
    use bulk_downloader::download::{FetchError, FetchOutcome};

    use super::*;

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        let mut report = BatchReport::new(1);
        report.record(FetchOutcome::new("a", 0, "/out/a").with_skip("00".repeat(32), 1));
        assert_eq!(determine_exit_outcome(&report), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_failure_when_any_item_failed() {
        let mut report = BatchReport::new(2);
        report.record(FetchOutcome::new("a", 0, "/out/a").with_skip("00".repeat(32), 1));
        report.record(
            FetchOutcome::new("b", 1, "/out/b")
                .with_failure(FetchError::UnexpectedStatus { code: 404 }, 1),
        );
        assert_eq!(determine_exit_outcome(&report), ProcessExit::Failure);
    }

    #[test]
    fn test_exit_outcome_failure_when_cancelled() {
        let mut report = BatchReport::new(0);
        report.mark_cancelled();
        assert_eq!(determine_exit_outcome(&report), ProcessExit::Failure);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Fatal.code(), 2);
    }
}
