//! Source-list parsing and local directory walking.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors reading a source list or walking a directory.
#[derive(Debug, Error)]
pub enum InputError {
    /// The source list file could not be read.
    #[error("cannot read source list {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The walk root is missing or not a directory.
    #[error("cannot walk {path}: {source}")]
    Walk {
        /// The directory that could not be listed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Splits text into source identifiers.
///
/// One identifier per line; surrounding whitespace is trimmed, and blank lines
/// and `#` comments are skipped.
///
/// # Examples
///
/// ```
/// use bulk_downloader::input::parse_sources;
///
/// let text = "# mirrors\nhttp://test/a.bin\n\n  http://test/b.bin  \n";
/// assert_eq!(parse_sources(text), ["http://test/a.bin", "http://test/b.bin"]);
/// ```
#[must_use]
pub fn parse_sources(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads and parses a source list file.
///
/// # Errors
///
/// Returns [`InputError::Read`] if the file cannot be read as UTF-8 text.
pub fn read_sources_file(path: &Path) -> Result<Vec<String>, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let sources = parse_sources(&text);
    debug!(path = %path.display(), count = sources.len(), "read source list");
    Ok(sources)
}

/// Lists every regular file under `root` as a bare path, sorted.
///
/// Uses an explicit worklist instead of recursion, so deep trees cannot
/// exhaust the stack. Symlinks are not followed. Unreadable subdirectories
/// are skipped with a warning; only an unreadable root is an error.
///
/// # Errors
///
/// Returns [`InputError::Walk`] if `root` cannot be listed.
pub fn walk_local_sources(root: &Path) -> Result<Vec<String>, InputError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if dir == root => {
                return Err(InputError::Walk { path: dir, source });
            }
            Err(error) => {
                warn!(path = %dir.display(), error = %error, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(path = %dir.display(), error = %error, "skipping unreadable entry");
                    continue;
                }
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    debug!(root = %root.display(), count = files.len(), "walked local sources");
    Ok(files
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect())
}
