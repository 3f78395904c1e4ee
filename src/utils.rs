//! Utility functions for hashing, string manipulation, and file system checks.
//!
//! This module provides helper functions used throughout the crate:
//! - Content addressing (SHA-256 hex digests)
//! - Character-safe truncation for titles and log previews
//! - Small list helpers used by the category filter
//! - File system validation for output directories

use sha2::{Digest, Sha256};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Hex-encoded SHA-256 digest of `s`.
///
/// # Examples
///
/// ```
/// use gamer_feed::utils::hash_sha256;
///
/// let hash = hash_sha256("https://site.test/news/1");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_sha256("https://site.test/news/1"));
/// ```
pub fn hash_sha256(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keep at most `max` characters of `s`.
///
/// Counts Unicode scalar values, never splitting a multi-byte character.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let kept = truncate_chars(s, max);
    if kept.len() == s.len() {
        kept
    } else {
        let rest = s.len() - kept.len();
        format!("{kept}…(+{rest} bytes)")
    }
}

/// Lower-case every item of a list.
pub fn to_lower(list: &[String]) -> Vec<String> {
    list.iter().map(|s| s.to_lowercase()).collect()
}

/// True when at least one of `values` is present in `list`.
pub fn contains_some(list: &[String], values: &[String]) -> bool {
    values.iter().any(|v| list.contains(v))
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
