//! Utility functions for filename sanitization, log formatting, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Slug sanitization for deterministic, filesystem-safe output names
//! - String truncation for logging response bodies and markup
//! - File system validation for output directories
//! - Counting directory entries for synthetic asset names

use crate::error::ScrapeError;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or below `max` bytes and
/// get an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Reduce a post slug to a filesystem-safe name.
///
/// Keeps alphanumerics, spaces, hyphens, and underscores; every other
/// character is dropped and trailing whitespace trimmed. A slug with nothing
/// left becomes `untitled`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_slug("hello, world!"), "hello world");
/// assert_eq!(sanitize_slug("../etc/passwd"), "etcpasswd");
/// ```
pub fn sanitize_slug(slug: &str) -> String {
    let kept: String = slug
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let kept = kept.trim_end();
    if kept.is_empty() {
        "untitled".to_string()
    } else {
        kept.to_string()
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory (and parents) if it doesn't exist, then performs a
/// write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns [`ScrapeError::Io`] if the directory cannot be created or a file
/// cannot be created inside it.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), ScrapeError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| ScrapeError::io(path, e))?;

    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(ScrapeError::io(path, e)),
    }
}

/// Number of entries currently in `dir`, or 0 if it cannot be listed.
pub fn count_entries(dir: &Path) -> usize {
    stdfs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
