//! Manga Fetcher Library
//!
//! A Rust library for downloading serialized comics published as paginated
//! HTML on hosts with anti-automation defenses. Provides a tiered
//! resilient fetcher, cascading-selector extraction tolerant of markup
//! drift, and an idempotent per-chapter download pipeline.

pub mod app;
pub mod cli;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_ATTEMPTS_PER_TIER, 3);
        assert_eq!(BUNDLE_EXTENSION, "cbz");
        assert_eq!(DEFAULT_OUTPUT_ROOT, "manga_downloads");
    }

    #[test]
    fn test_error_types() {
        let fetch_error = errors::FetchError::TunnelUnavailable;
        let app_error = AppError::Fetch(fetch_error);

        assert_eq!(app_error.category(), "fetch");
        assert!(app_error.is_recoverable());
    }
}
