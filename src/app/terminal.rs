use crate::cli::Args;

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_use_progress_bar(
    stderr_is_terminal: bool,
    quiet: bool,
    suppressed: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !suppressed && !dumb_terminal
}

/// Default filter when `RUST_LOG` is unset: quiet > verbose > info.
pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_progress_bar_needs_interactive_stderr() {
        assert!(should_use_progress_bar(true, false, false, false));
        assert!(!should_use_progress_bar(false, false, false, false));
        assert!(!should_use_progress_bar(true, true, false, false));
        assert!(!should_use_progress_bar(true, false, true, false));
        assert!(!should_use_progress_bar(true, false, false, true));
    }

    #[test]
    fn test_default_log_level() {
        let level = |argv: &[&str]| resolve_default_log_level(&Args::try_parse_from(argv).unwrap());
        assert_eq!(level(&["bulk-downloader"]), "info");
        assert_eq!(level(&["bulk-downloader", "-v"]), "debug");
        assert_eq!(level(&["bulk-downloader", "-vvv"]), "trace");
        assert_eq!(level(&["bulk-downloader", "-q"]), "error");
    }
}
