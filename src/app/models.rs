//! Core data types for the acquisition pipeline
//!
//! Defines the chapter and page-image records produced by listing
//! resolution, the verified local artifact record, and the small pure
//! functions the pipeline shares: sequence-key derivation, the
//! image-likeness predicate, and filename sanitation.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::constants::{media, placeholders};

/// One addressable division of the work, in reading order.
///
/// Chapters are unique by `source_url` (first occurrence wins under the
/// site's own listing order) and immutable once listing resolution has
/// produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// Derived ordering key; fractional numbering ("12.5") is supported
    pub sequence_key: f64,
    /// Human-readable name, already filename-safe
    pub display_name: String,
    /// Resolved absolute URL of the chapter page
    pub source_url: Url,
}

impl Chapter {
    /// Build a chapter from a resolved URL and raw display name,
    /// deriving the sequence key from both.
    pub fn new(display_name: &str, source_url: Url) -> Self {
        let display_name = sanitize_filename(display_name);
        let sequence_key = sequence_key(&display_name, source_url.as_str());
        Self {
            sequence_key,
            display_name,
            source_url,
        }
    }
}

/// One raster image belonging to a chapter, at a 1-based ordinal position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Position in the chapter's resolved media sequence (1-based)
    pub ordinal: usize,
    /// Resolved absolute URL of the image
    pub source_url: Url,
}

/// A page image that has been written to disk and verified non-empty.
///
/// Constructed only after the write transaction completes; the pipeline
/// never reports a zero-byte or missing file as downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    /// Ordinal of the page within its chapter
    pub ordinal: usize,
    /// Final path of the written file
    pub file_path: PathBuf,
    /// Verified size, always greater than zero
    pub byte_size: u64,
}

static NUMBER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)").expect("number token pattern is valid")
});

static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("filename pattern is valid"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Derive the ordering key for a chapter from its display name and URL.
///
/// Scans `"{name} {url}"` for numeric tokens and takes the last match,
/// which is usually the chapter number and supports fractional numbering.
/// Returns `0.0` when no number is present. The last-token heuristic can
/// misorder names with unrelated trailing numbers; kept as-is because the
/// source sites offer nothing better.
pub fn sequence_key(name: &str, url: &str) -> f64 {
    let haystack = format!("{} {}", name, url);
    NUMBER_TOKEN
        .find_iter(&haystack)
        .last()
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Image-likeness predicate applied before a URL is admitted as a page.
///
/// Requires a known raster extension somewhere in the URL and rejects
/// decorative or navigational assets by keyword.
pub fn is_image_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    let has_extension = media::IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext));
    let has_avoid_keyword = media::AVOID_KEYWORDS.iter().any(|kw| lower.contains(kw));
    has_extension && !has_avoid_keyword
}

/// Extract the image extension from a URL, defaulting to `.jpg`
pub fn image_extension(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    media::IMAGE_EXTENSIONS
        .iter()
        .find(|ext| lower.contains(*ext))
        .copied()
        .unwrap_or(media::DEFAULT_IMAGE_EXTENSION)
}

/// Make a string safe for use as a file or directory name.
///
/// Replaces characters rejected by common filesystems, collapses
/// whitespace runs and trims the result.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = INVALID_FILENAME_CHARS.replace_all(name, "_");
    let collapsed = WHITESPACE_RUN.replace_all(&replaced, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        placeholders::UNKNOWN_CHAPTER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sort chapters ascending by sequence key, stable on ties so that the
/// site's own listing order breaks them.
pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| {
        a.sequence_key
            .partial_cmp(&b.sequence_key)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
