//! Utility functions for filename hygiene, logging, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Title sanitization for article directory names
//! - Log-safe string truncation (multi-byte aware, most logged text is CJK)
//! - Image type sniffing for extensionless download URLs
//! - File system validation for output directories

use std::fs as stdfs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::PersistError;

/// Characters that are unsafe in directory names on common filesystems.
static UNSAFE_TITLE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\\/*?:"<>|]"#).expect("unsafe-title pattern is valid")
});

/// Maximum length, in characters, of the title part of an article directory.
const MAX_TITLE_CHARS: usize = 100;

/// Sanitize an article title for use as a directory name component.
///
/// Strips filesystem-unsafe characters (`\ / * ? : " < > |`), trims
/// surrounding whitespace, and caps the result at 100 characters. The cap
/// counts characters, not bytes, so CJK titles are not cut mid-codepoint.
///
/// # Arguments
///
/// * `title` - The raw article title
///
/// # Returns
///
/// A filesystem-safe title fragment; may be empty if the input was nothing
/// but unsafe characters.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = UNSAFE_TITLE_CHARS.replace_all(title, "");
    cleaned.trim().chars().take(MAX_TITLE_CHARS).collect()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended. Truncation always lands on a character
/// boundary, so CJK page bodies and titles log safely.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of characters to keep
///
/// # Returns
///
/// The original string if within `max` characters, otherwise a truncated
/// version with `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Guess an image file extension from the leading bytes of a download.
///
/// Used when an image URL has no usable path component to name the file
/// after. Recognizes the common formats news CMSes actually serve.
///
/// # Returns
///
/// `Some("jpg" | "png" | "gif" | "webp" | "bmp")`, or `None` when the bytes
/// match no known signature.
pub fn sniff_image_ext(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else {
        None
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file. Run once per output root
/// before any crawl or persist pass so permission problems surface up front
/// rather than mid-run.
///
/// # Errors
///
/// Returns a [`PersistError`] if the directory cannot be created or is not
/// writable (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), PersistError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| PersistError::io(path, e))?;

    // Small sync probe write; simpler error surface than async here.
    let probe = path.join("..__probe_write__");
    match stdfs::File::create(&probe) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(PersistError::io(path, e)),
    }
}
