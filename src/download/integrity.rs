//! On-disk content hashing.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::constants::LOCAL_COPY_CHUNK_SIZE;
use super::error::DownloadError;

/// Computes the hex-encoded SHA-256 of a file.
///
/// Produces the same digest a fetch strategy reports for the bytes it wrote.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the file cannot be opened or read.
pub async fn hash_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; LOCAL_COPY_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Returns true when the file's SHA-256 equals `expected` (case-insensitive hex).
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the file cannot be read.
pub async fn verify_file(path: &Path, expected: &str) -> Result<bool, DownloadError> {
    Ok(hash_file(path).await?.eq_ignore_ascii_case(expected))
}
