//! Error types for Manga Fetcher
//!
//! This module defines error types for all components of the application.
//! The taxonomy mirrors the pipeline's propagation policy: transport errors
//! and soft blocks are retried inside the fetcher and never surface; tier
//! exhaustion surfaces as a failed fetch; an invalid written artifact always
//! demotes a download from success to failure.

use std::path::PathBuf;
use thiserror::Error;

/// Fetch and tier-escalation errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, connection, timeout)
    #[error("HTTP transport error")]
    Transport(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Every enabled tier exhausted its retry budget
    #[error("All fetch tiers exhausted for {url}")]
    TiersExhausted { url: String },

    /// Browser automation tier failed
    #[error("Browser automation failed: {reason}")]
    Browser { reason: String },

    /// Tunnel reported disconnected and could not be reconnected
    #[error("Tunnel session disconnected and reconnection failed")]
    TunnelUnavailable,
}

/// Page download and artifact verification errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Fetch failed after all tiers
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Written file is missing or zero-length after a successful fetch
    #[error("Artifact invalid after write: {path}")]
    ArtifactInvalid { path: PathBuf },

    /// Atomic rename from temp file to final destination failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

/// Listing and extraction errors
///
/// An empty cascade result is not an error; these cover only genuine
/// failures such as an unreachable root page.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Root listing page could not be fetched at all
    #[error("Listing page unreachable: {url}")]
    ListingUnreachable { url: String },
}

/// Bundle assembly errors
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// No verified pages were available to assemble
    #[error("No pages to assemble for {name}")]
    NoPages { name: String },

    /// I/O error while writing the bundle
    #[error("Bundle I/O error")]
    Io(#[from] std::io::Error),

    /// Zip container error
    #[error("Bundle container error")]
    Zip(#[from] zip::result::ZipError),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Scrape error
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// Assembly error
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Fetch(FetchError::Transport(_))
                | AppError::Fetch(FetchError::TunnelUnavailable)
                | AppError::Download(DownloadError::Fetch(_))
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => "fetch",
            AppError::Download(_) => "download",
            AppError::Scrape(_) => "scrape",
            AppError::Assembly(_) => "assembly",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::Fetch(FetchError::TiersExhausted {
            url: "https://example.com".to_string(),
        });
        assert_eq!(err.category(), "fetch");
        assert!(!err.is_recoverable());

        let err = AppError::Fetch(FetchError::TunnelUnavailable);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_artifact_invalid_display() {
        let err = DownloadError::ArtifactInvalid {
            path: PathBuf::from("/tmp/page_001.jpg"),
        };
        assert!(err.to_string().contains("page_001.jpg"));
    }
}
