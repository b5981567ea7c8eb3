//! Prelude module for Manga Fetcher Library
//!
//! Re-exports the items needed for typical embedding: build a fetcher,
//! construct a pipeline, run it against a work URL.
//!
//! # Usage
//!
//! ```rust,no_run
//! use manga_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let fetcher = ResilientFetcher::new(FetcherConfig::default())?;
//!     let mut pipeline = Pipeline::new(
//!         fetcher,
//!         Box::new(CbzAssembler),
//!         PipelineConfig::default(),
//!         CancellationToken::new(),
//!     );
//!     let url = url::Url::parse("https://example.com/manga/title")
//!         .map_err(|e| AppError::generic(e.to_string()))?;
//!     let summary = pipeline.run(&url).await?;
//!     println!("{} chapters completed", summary.chapters_completed);
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential pipeline components
pub use crate::app::{
    BundleAssembler, CbzAssembler, Chapter, ChromiumEngine, Fetch, FetchResult, FetchTier,
    FetcherConfig, LocalArtifact, OpenVpnTunnel, PageImage, Pipeline, PipelineConfig,
    ResilientFetcher, RunSummary, TunnelSession,
};

// Cancellation handle used by the pipeline
pub use tokio_util::sync::CancellationToken;

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        // Verify that all essential types are available through prelude
        let _fetcher_config = FetcherConfig::default();
        let _pipeline_config = PipelineConfig::default();
        let _token = CancellationToken::new();
        let _path = PathBuf::from("/tmp/test");
    }
}
