//! Core application logic for Manga Fetcher
//!
//! This module contains the acquisition pipeline: the tiered resilient
//! fetcher, the selector-cascade extractor, listing resolution, the
//! per-page download state machine, bundle assembly and the orchestrator
//! that sequences them.

pub mod assembly;
pub mod download;
pub mod extract;
pub mod fetch;
pub mod listing;
pub mod models;
pub mod pipeline;
pub mod tunnel;

// Re-export main public API
pub use assembly::{BundleAssembler, CbzAssembler};
pub use download::{download_page, ItemOutcome};
pub use extract::{evaluate, Candidate, ExtractionRule, ValueSource};
pub use fetch::{
    classify, BrowserEngine, ChromiumEngine, Classification, Fetch, FetchResult, FetchTier,
    FetcherConfig, Identity, IdentityPool, ResilientFetcher,
};
pub use listing::ListingResolver;
pub use models::{
    image_extension, is_image_url, sanitize_filename, sequence_key, Chapter, LocalArtifact,
    PageImage,
};
pub use pipeline::{Pipeline, PipelineConfig, RunSummary};
pub use tunnel::{OpenVpnTunnel, TunnelSession};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible with sane defaults
        let fetcher_config = FetcherConfig::default();
        assert!(fetcher_config.attempts_per_tier > 0);

        let pipeline_config = PipelineConfig::default();
        assert!(pipeline_config.max_chapters.is_none());
    }
}
