//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bulk_downloader::config::CliOverrides;

/// Download a list of files concurrently, with a global rate limit and retries.
///
/// Sources come from positional arguments, `--input`, `--from-dir`, or stdin
/// when it is piped. Each source is written into the output directory and
/// verified with SHA-256.
#[derive(Parser, Debug)]
#[command(name = "bulk-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Source URLs or local paths
    #[arg(value_name = "SOURCES")]
    pub sources: Vec<String>,

    /// Read sources from a file, one per line (`#` starts a comment)
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Copy every regular file under a local directory
    #[arg(long, value_name = "DIR")]
    pub from_dir: Option<PathBuf>,

    /// Output directory [default: ./downloads]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100) [default: 5]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum retry attempts for transient failures (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Fetch starts per second across all workers, 0 to disable [default: 5]
    #[arg(short = 'l', long, value_parser = parse_rate_limit)]
    pub rate_limit: Option<f64>,

    /// Keep files that already exist in the output directory
    #[arg(long)]
    pub skip_existing: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Config file path [default: $XDG_CONFIG_HOME/bulk-downloader/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Flags that override config file values.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_dir: self.output_dir.clone(),
            concurrency: self.concurrency.map(usize::from),
            rate_limit: self.rate_limit,
            max_retries: self.max_retries.map(u32::from),
            skip_existing: self.skip_existing,
        }
    }
}

fn parse_rate_limit(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("`{raw}` must be a finite number >= 0"));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["bulk-downloader"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.sources.is_empty());
        assert!(args.concurrency.is_none());
        assert!(args.max_retries.is_none());
        assert!(args.rate_limit.is_none());
        assert!(!args.skip_existing);
        assert!(!args.json);
    }

    #[test]
    fn test_cli_positional_sources() {
        let args =
            Args::try_parse_from(["bulk-downloader", "http://a/1", "http://a/2"]).unwrap();
        assert_eq!(args.sources, ["http://a/1", "http://a/2"]);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["bulk-downloader", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Args::try_parse_from(["bulk-downloader", "-q", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["bulk-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["bulk-downloader", "-c", "100"]).unwrap();
        assert_eq!(args.concurrency, Some(100));

        for bad in ["0", "101"] {
            let err = Args::try_parse_from(["bulk-downloader", "-c", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_retries_bounds() {
        let args = Args::try_parse_from(["bulk-downloader", "--max-retries", "0"]).unwrap();
        assert_eq!(args.max_retries, Some(0));

        let err = Args::try_parse_from(["bulk-downloader", "-r", "11"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rate_limit_accepts_fractions_and_zero() {
        let args = Args::try_parse_from(["bulk-downloader", "-l", "0.5"]).unwrap();
        assert_eq!(args.rate_limit, Some(0.5));

        let args = Args::try_parse_from(["bulk-downloader", "--rate-limit", "0"]).unwrap();
        assert_eq!(args.rate_limit, Some(0.0));
    }

    #[test]
    fn test_cli_rate_limit_rejects_negative_and_garbage() {
        for bad in ["-1", "fast", "inf"] {
            let result = Args::try_parse_from(["bulk-downloader", "--rate-limit", bad]);
            assert!(result.is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_cli_input_and_from_dir() {
        let args = Args::try_parse_from([
            "bulk-downloader",
            "--input",
            "urls.txt",
            "--from-dir",
            "/data",
            "-o",
            "out",
        ])
        .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("urls.txt")));
        assert_eq!(args.from_dir, Some(PathBuf::from("/data")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_cli_overrides_only_carry_given_flags() {
        let args =
            Args::try_parse_from(["bulk-downloader", "-c", "4", "--skip-existing"]).unwrap();
        let overrides = args.overrides();
        assert_eq!(overrides.concurrency, Some(4));
        assert!(overrides.skip_existing);
        assert!(overrides.max_retries.is_none());
        assert!(overrides.output_dir.is_none());
    }
}
