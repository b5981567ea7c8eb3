//! Application constants for Manga Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 4;

    /// Maximum redirect hops the fetcher will follow manually
    pub const MAX_REDIRECT_HOPS: u32 = 10;

    /// Redirect hops above this count classify as a soft block.
    /// Open redirect chains are a known block-page symptom.
    pub const REDIRECT_SOFT_BLOCK_THRESHOLD: u32 = 2;
}

/// Retry, backoff and tier escalation configuration
pub mod limits {
    use super::Duration;

    /// Default attempts per fetch tier before escalating
    pub const DEFAULT_ATTEMPTS_PER_TIER: u32 = 3;

    /// Base delay for linear backoff between attempts
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Jitter fraction applied to backoff delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.25;

    /// Requests per second against the target host
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 2;

    /// Wait applied before re-requesting through the challenge solver,
    /// matching the standard interstitial JS-challenge delay
    pub const CHALLENGE_SOLVE_DELAY: Duration = Duration::from_secs(5);

    /// Bounded wait for the browser tier to reach document-ready
    pub const BROWSER_READY_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Pacing delays between network-incurring pipeline steps
pub mod pacing {
    use super::Duration;

    /// Default delay between page downloads within a chapter
    pub const PAGE_DELAY: Duration = Duration::from_secs(1);

    /// Default delay between chapters
    pub const CHAPTER_DELAY: Duration = Duration::from_secs(3);

    /// Jitter fraction applied to pacing delays (0.0-1.0)
    pub const PACING_JITTER_FACTOR: f64 = 0.5;
}

/// Media admission rules
pub mod media {
    /// Raster extensions that qualify a URL as a page image
    pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif", ".bmp"];

    /// Keywords marking decorative or navigational images to skip
    pub const AVOID_KEYWORDS: &[&str] = &["avatar", "profile", "icon", "logo", "button", "banner"];

    /// Extension used when none can be derived from the URL
    pub const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";
}

/// Markers identifying a bot-challenge interstitial page
pub mod challenge {
    /// Lowercase substrings that flag a response body as a challenge page
    pub const BODY_MARKERS: &[&str] = &[
        "just a moment",
        "cf-chl",
        "challenge-platform",
        "checking your browser",
        "attention required",
    ];

    /// Maximum body prefix inspected for challenge markers
    pub const BODY_SCAN_LIMIT: usize = 16 * 1024;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic writes
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Write chunk size for streaming page bodies to disk (8KB)
    pub const WRITE_CHUNK_SIZE: usize = 8 * 1024;

    /// Default root directory for downloaded works
    pub const DEFAULT_OUTPUT_ROOT: &str = "manga_downloads";

    /// Extension of assembled chapter bundles
    pub const BUNDLE_EXTENSION: &str = "cbz";
}

/// Fallback names when extraction yields nothing
pub mod placeholders {
    /// Title used when no cascade rule matches the work page
    pub const UNKNOWN_WORK: &str = "manga_unknown";

    /// Display name used when a chapter anchor carries no usable text
    pub const UNKNOWN_CHAPTER: &str = "chapter_unknown";
}

// Re-export commonly used constants for convenience
pub use files::{BUNDLE_EXTENSION, DEFAULT_OUTPUT_ROOT, TEMP_FILE_SUFFIX};
pub use limits::{DEFAULT_ATTEMPTS_PER_TIER, DEFAULT_RATE_LIMIT_RPS, RETRY_BASE_DELAY};
