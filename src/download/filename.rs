//! Destination filename derivation and sanitization.
//!
//! Every work item lands directly under the output directory. The name is a
//! pure function of the source identifier so that re-running a batch maps each
//! source onto the same file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

use super::constants::{FALLBACK_FILENAME_PREFIX, PART_FILE_SUFFIX};

/// Derives the destination filename for a source identifier.
///
/// - URLs use their last percent-decoded path segment; query and fragment are ignored.
/// - Bare paths use their last component.
/// - Empty, `.`/`..` or dot-only results fall back to [`fallback_filename`].
///
/// # Examples
///
/// ```
/// use bulk_downloader::download::destination_filename;
///
/// assert_eq!(destination_filename("http://test/a.bin"), "a.bin");
/// assert_eq!(destination_filename("https://host/dir/report%20v2.pdf?x=1"), "report v2.pdf");
/// assert_eq!(destination_filename("/data/archive/log.txt"), "log.txt");
/// assert!(destination_filename("https://host/").starts_with("downloaded_file_"));
/// ```
#[must_use]
pub fn destination_filename(source_id: &str) -> String {
    let candidate = match Url::parse(source_id) {
        Ok(url) if !url.cannot_be_a_base() && url.scheme().len() > 1 => last_url_segment(&url),
        _ => last_path_component(source_id),
    };

    let sanitized = sanitize_filename(&candidate);
    if is_usable_filename(&sanitized) {
        sanitized
    } else {
        fallback_filename(source_id)
    }
}

/// Replaces path-unsafe characters with `_`.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
/// plus control characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Hash-derived name used when a source yields no usable filename.
#[must_use]
pub fn fallback_filename(source_id: &str) -> String {
    let digest = Sha256::digest(source_id.as_bytes());
    format!("{FALLBACK_FILENAME_PREFIX}{}", hex::encode(digest))
}

/// Path of the in-flight sibling a transfer writes before the final rename.
#[must_use]
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(PART_FILE_SUFFIX);
    destination.with_file_name(name)
}

fn last_url_segment(url: &Url) -> String {
    let Some(last) = url.path_segments().and_then(|mut s| s.next_back()) else {
        return String::new();
    };
    urlencoding::decode(last)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| last.to_string())
}

fn last_path_component(source_id: &str) -> String {
    source_id
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

fn is_usable_filename(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().all(|c| c == '.')
}
