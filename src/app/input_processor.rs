//! Assembles the source list from arguments, files, directories and stdin.

use std::io::{self, IsTerminal, Read};

use anyhow::{Context, Result};
use bulk_downloader::input::{parse_sources, read_sources_file, walk_local_sources};
use tracing::debug;

use crate::cli::Args;

/// Collects sources in a fixed order: positional, `--input`, `--from-dir`, stdin.
///
/// Stdin is read only when it is piped.
pub(crate) fn gather_sources(args: &Args) -> Result<Vec<String>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read sources from stdin")?;
        Some(buffer)
    };
    collect_sources(args, stdin_text.as_deref())
}

fn collect_sources(args: &Args, stdin_text: Option<&str>) -> Result<Vec<String>> {
    let mut sources = parse_sources(&args.sources.join("\n"));

    if let Some(path) = args.input.as_deref() {
        sources.extend(read_sources_file(path)?);
    }

    if let Some(root) = args.from_dir.as_deref() {
        sources.extend(walk_local_sources(root)?);
    }

    if let Some(text) = stdin_text {
        let piped = parse_sources(text);
        debug!(count = piped.len(), "read sources from stdin");
        sources.extend(piped);
    }

    Ok(sources)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_collect_sources_orders_all_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let list = temp_dir.path().join("urls.txt");
        std::fs::write(&list, "# list\nhttp://test/from-file\n").unwrap();
        let data = temp_dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("local.bin"), b"x").unwrap();

        let args = Args::try_parse_from([
            "bulk-downloader",
            "--input",
            list.to_str().unwrap(),
            "--from-dir",
            data.to_str().unwrap(),
            "http://test/positional",
        ])
        .unwrap();

        let sources = collect_sources(&args, Some("\nhttp://test/from-stdin\n")).unwrap();

        assert_eq!(sources.len(), 4);
        assert_eq!(sources[0], "http://test/positional");
        assert_eq!(sources[1], "http://test/from-file");
        assert!(sources[2].ends_with("local.bin"));
        assert_eq!(sources[3], "http://test/from-stdin");
    }

    #[test]
    fn test_collect_sources_empty() {
        let args = Args::try_parse_from(["bulk-downloader"]).unwrap();
        assert!(collect_sources(&args, None).unwrap().is_empty());
        assert!(collect_sources(&args, Some("  \n# nothing\n")).unwrap().is_empty());
    }

    #[test]
    fn test_collect_sources_missing_input_file_is_error() {
        let args =
            Args::try_parse_from(["bulk-downloader", "--input", "/no/such/urls.txt"]).unwrap();
        assert!(collect_sources(&args, None).is_err());
    }
}
