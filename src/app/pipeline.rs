//! Pipeline orchestration
//!
//! Sequences title resolution, chapter listing, per-chapter page listing,
//! the page download state machine and bundle assembly, strictly in
//! resolved order with no concurrent fetches against the target host.
//! Pacing delays between every network-incurring step bound the request
//! rate; sequential processing is a politeness constraint, not a
//! performance shortcut, because detectability is the dominant operating
//! risk.
//!
//! Failure policy: a failed page never aborts its chapter, a chapter with
//! zero verified pages never aborts the run, and assembly failure is
//! logged and skipped. Only chapter-listing resolution failure is fatal.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::app::assembly::BundleAssembler;
use crate::app::download::{download_page, ItemOutcome};
use crate::app::fetch::{jittered, Fetch};
use crate::app::listing::ListingResolver;
use crate::app::models::{image_extension, Chapter, LocalArtifact};
use crate::constants::{files, pacing};
use crate::errors::{AppError, Result};

/// Pipeline configuration, the single owner of all run-level knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory receiving `<title>/<chapter>` output
    pub output_root: PathBuf,
    /// Cap on the number of chapters processed, in reading order
    pub max_chapters: Option<usize>,
    /// Delay between page downloads within a chapter
    pub page_delay: Duration,
    /// Delay between chapters
    pub chapter_delay: Duration,
    /// Keep staged page files after successful bundle assembly
    pub keep_pages: bool,
    /// Draw a per-chapter progress bar
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(files::DEFAULT_OUTPUT_ROOT),
            max_chapters: None,
            page_delay: pacing::PAGE_DELAY,
            chapter_delay: pacing::CHAPTER_DELAY,
            keep_pages: false,
            show_progress: true,
        }
    }
}

/// Aggregate counters reported at run end
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Chapters the pipeline started processing
    pub chapters_attempted: usize,
    /// Chapters that produced at least one verified artifact
    pub chapters_completed: usize,
    /// Pages verified on disk (including resumed ones)
    pub pages_verified: usize,
    /// Pages that ended in the failed state
    pub pages_failed: usize,
}

impl RunSummary {
    /// Whether the run produced anything at all; drives the exit status
    pub fn produced_output(&self) -> bool {
        self.chapters_completed > 0
    }
}

/// Drives the full acquisition run for one work
pub struct Pipeline<F: Fetch> {
    fetcher: F,
    assembler: Box<dyn BundleAssembler>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<F: Fetch> Pipeline<F> {
    pub fn new(
        fetcher: F,
        assembler: Box<dyn BundleAssembler>,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            assembler,
            config,
            cancel,
        }
    }

    /// Run the pipeline to completion (or cancellation).
    ///
    /// Fetcher resources (browser session, tunnel) are torn down on every
    /// exit path, normal or not.
    pub async fn run(&mut self, work_url: &Url) -> Result<RunSummary> {
        let outcome = self.run_inner(work_url).await;
        self.fetcher.shutdown().await;
        outcome
    }

    async fn run_inner(&mut self, work_url: &Url) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let mut resolver = ListingResolver::new(&mut self.fetcher);
        let title = resolver.resolve_title(work_url).await;
        info!("work title: {}", title);

        let mut chapters = resolver.resolve_chapters(work_url).await.map_err(AppError::Scrape)?;
        if chapters.is_empty() {
            // Normal terminal state, not a crash
            info!("no chapters found at {}", work_url);
            return Ok(summary);
        }
        if let Some(limit) = self.config.max_chapters {
            chapters.truncate(limit);
        }
        info!("processing {} chapters", chapters.len());

        let work_dir = self.config.output_root.join(&title);
        tokio::fs::create_dir_all(&work_dir).await?;

        let bar = self.chapter_bar(chapters.len());
        let chapter_count = chapters.len();

        for (index, chapter) in chapters.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("run cancelled, stopping before next chapter");
                break;
            }

            summary.chapters_attempted += 1;
            bar.set_message(chapter.display_name.clone());

            let (artifacts, failed) = self.process_chapter(chapter, &work_dir).await;
            summary.pages_failed += failed;

            if artifacts.is_empty() {
                warn!("chapter '{}' produced no verified pages", chapter.display_name);
                bar.inc(1);
                continue;
            }
            summary.pages_verified += artifacts.len();
            summary.chapters_completed += 1;

            self.assemble_chapter(chapter, &work_dir, &artifacts).await;
            bar.inc(1);

            if index + 1 < chapter_count && !self.cancel.is_cancelled() {
                tokio::time::sleep(jittered(
                    self.config.chapter_delay,
                    pacing::PACING_JITTER_FACTOR,
                ))
                .await;
            }
        }

        bar.finish_and_clear();
        info!(
            "run finished: {}/{} chapters completed, {} pages verified, {} failed",
            summary.chapters_completed,
            summary.chapters_attempted,
            summary.pages_verified,
            summary.pages_failed
        );
        Ok(summary)
    }

    /// Resolve and download one chapter's pages, in ascending ordinal
    /// order, returning the ordered verified artifacts and failure count.
    async fn process_chapter(
        &mut self,
        chapter: &Chapter,
        work_dir: &std::path::Path,
    ) -> (Vec<LocalArtifact>, usize) {
        let mut resolver = ListingResolver::new(&mut self.fetcher);
        let pages = resolver.resolve_pages(&chapter.source_url).await;
        if pages.is_empty() {
            return (Vec::new(), 0);
        }

        let staging_dir = work_dir.join(&chapter.display_name);
        let mut artifacts = Vec::new();
        let mut failed = 0;
        let page_count = pages.len();

        for page in &pages {
            if self.cancel.is_cancelled() {
                break;
            }

            let extension = image_extension(page.source_url.as_str());
            let destination = staging_dir.join(format!("page_{:03}{}", page.ordinal, extension));

            match download_page(&mut self.fetcher, page, &destination).await {
                ItemOutcome::Verified(artifact) | ItemOutcome::Skipped(artifact) => {
                    artifacts.push(artifact);
                }
                ItemOutcome::Failed => failed += 1,
            }

            if page.ordinal < page_count {
                tokio::time::sleep(jittered(
                    self.config.page_delay,
                    pacing::PACING_JITTER_FACTOR,
                ))
                .await;
            }
        }

        (artifacts, failed)
    }

    /// Hand the ordered artifact set to the assembler; failure is logged,
    /// never fatal, and staged pages are kept for a later retry.
    async fn assemble_chapter(
        &mut self,
        chapter: &Chapter,
        work_dir: &std::path::Path,
        artifacts: &[LocalArtifact],
    ) {
        let bundle_path = work_dir.join(format!(
            "{}.{}",
            chapter.display_name,
            files::BUNDLE_EXTENSION
        ));
        let page_paths: Vec<PathBuf> =
            artifacts.iter().map(|a| a.file_path.clone()).collect();

        match self.assembler.assemble(&page_paths, &bundle_path).await {
            Ok(()) => {
                if !self.config.keep_pages {
                    let staging_dir = work_dir.join(&chapter.display_name);
                    if let Err(e) = tokio::fs::remove_dir_all(&staging_dir).await {
                        warn!("failed to clean staged pages: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "bundle assembly failed for '{}': {}",
                    chapter.display_name, e
                );
            }
        }
    }

    fn chapter_bar(&self, chapters: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(chapters as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style);
        }
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::app::assembly::CbzAssembler;
    use crate::app::fetch::{FetchResult, FetchTier};
    use crate::errors::{AssemblyError, FetchError};

    /// Serves canned bodies keyed by URL path; unknown paths fail
    struct MapFetcher {
        routes: HashMap<String, Vec<u8>>,
        shutdowns: u32,
    }

    impl MapFetcher {
        fn new(routes: &[(&str, &[u8])]) -> Self {
            Self {
                routes: routes
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.to_vec()))
                    .collect(),
                shutdowns: 0,
            }
        }
    }

    #[async_trait]
    impl Fetch for MapFetcher {
        // Fully qualified: the crate-level `Result` alias imported by
        // `use super::*` takes one parameter
        async fn fetch(&mut self, url: &Url) -> std::result::Result<FetchResult, FetchError> {
            match self.routes.get(url.path()) {
                Some(body) => Ok(FetchResult {
                    content: body.clone(),
                    status: 200,
                    tier: FetchTier::Direct,
                }),
                None => Err(FetchError::TiersExhausted {
                    url: url.to_string(),
                }),
            }
        }

        async fn shutdown(&mut self) {
            self.shutdowns += 1;
        }
    }

    fn quick_config(output_root: PathBuf) -> PipelineConfig {
        PipelineConfig {
            output_root,
            page_delay: Duration::from_millis(0),
            chapter_delay: Duration::from_millis(0),
            show_progress: false,
            ..Default::default()
        }
    }

    const ROOT_HTML: &[u8] = br#"
        <h1 class="entry-title">Test Work</h1>
        <div class="chapter-list">
          <a href="/work/chapter-2">Chapter 2</a>
          <a href="/work/chapter-1">Chapter 1</a>
        </div>"#;

    const CHAPTER_HTML: &[u8] = br#"
        <div class="reading-content">
          <img src="/img/p1.jpg">
          <img src="/img/p2.jpg">
        </div>"#;

    fn full_site() -> MapFetcher {
        MapFetcher::new(&[
            ("/work/my-title", ROOT_HTML),
            ("/work/chapter-1", CHAPTER_HTML),
            ("/work/chapter-2", CHAPTER_HTML),
            ("/img/p1.jpg", b"image-one-bytes"),
            ("/img/p2.jpg", b"image-two-bytes"),
        ])
    }

    #[tokio::test]
    async fn test_full_run_produces_bundles_in_order() {
        let dir = tempdir().unwrap();
        let fetcher = full_site();
        let mut pipeline = Pipeline::new(
            fetcher,
            Box::new(CbzAssembler),
            quick_config(dir.path().to_path_buf()),
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        assert_eq!(summary.chapters_attempted, 2);
        assert_eq!(summary.chapters_completed, 2);
        assert_eq!(summary.pages_verified, 4);
        assert_eq!(summary.pages_failed, 0);
        assert!(summary.produced_output());

        let work_dir = dir.path().join("Test Work");
        assert!(work_dir.join("Chapter 1.cbz").exists());
        assert!(work_dir.join("Chapter 2.cbz").exists());
        // Staged pages removed after successful assembly
        assert!(!work_dir.join("Chapter 1").exists());
    }

    #[tokio::test]
    async fn test_failed_page_does_not_abort_chapter() {
        let dir = tempdir().unwrap();
        let mut fetcher = full_site();
        fetcher.routes.remove("/img/p2.jpg");

        let mut pipeline = Pipeline::new(
            fetcher,
            Box::new(CbzAssembler),
            quick_config(dir.path().to_path_buf()),
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        assert_eq!(summary.chapters_completed, 2);
        assert_eq!(summary.pages_verified, 2);
        assert_eq!(summary.pages_failed, 2);
    }

    #[tokio::test]
    async fn test_chapter_with_no_pages_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let mut fetcher = full_site();
        fetcher.routes.remove("/work/chapter-1");

        let mut pipeline = Pipeline::new(
            fetcher,
            Box::new(CbzAssembler),
            quick_config(dir.path().to_path_buf()),
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        assert_eq!(summary.chapters_attempted, 2);
        assert_eq!(summary.chapters_completed, 1);
    }

    #[tokio::test]
    async fn test_no_chapters_is_normal_termination() {
        let dir = tempdir().unwrap();
        let fetcher = MapFetcher::new(&[(
            "/work/empty",
            b"<html><body><p>nothing</p></body></html>" as &[u8],
        )]);

        let mut pipeline = Pipeline::new(
            fetcher,
            Box::new(CbzAssembler),
            quick_config(dir.path().to_path_buf()),
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/empty").unwrap();
        let summary = pipeline.run(&url).await.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert!(!summary.produced_output());
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_fatal() {
        let dir = tempdir().unwrap();
        let fetcher = MapFetcher::new(&[]);

        let mut pipeline = Pipeline::new(
            fetcher,
            Box::new(CbzAssembler),
            quick_config(dir.path().to_path_buf()),
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/gone").unwrap();
        assert!(pipeline.run(&url).await.is_err());
    }

    #[tokio::test]
    async fn test_max_chapters_limit() {
        let dir = tempdir().unwrap();
        let mut config = quick_config(dir.path().to_path_buf());
        config.max_chapters = Some(1);

        let mut pipeline = Pipeline::new(
            full_site(),
            Box::new(CbzAssembler),
            config,
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        // Chapters are sorted before truncation, so the limit keeps the
        // earliest chapter
        assert_eq!(summary.chapters_attempted, 1);
        let work_dir = dir.path().join("Test Work");
        assert!(work_dir.join("Chapter 1.cbz").exists());
        assert!(!work_dir.join("Chapter 2.cbz").exists());
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_chapters_and_shuts_down() {
        let dir = tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut pipeline = Pipeline::new(
            full_site(),
            Box::new(CbzAssembler),
            quick_config(dir.path().to_path_buf()),
            cancel,
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        assert_eq!(summary.chapters_attempted, 0);
        assert_eq!(pipeline.fetcher.shutdowns, 1);
    }

    #[tokio::test]
    async fn test_assembly_failure_is_logged_not_fatal() {
        struct FailingAssembler;

        #[async_trait]
        impl BundleAssembler for FailingAssembler {
            async fn assemble(
                &self,
                _pages: &[PathBuf],
                output: &std::path::Path,
            ) -> std::result::Result<(), AssemblyError> {
                Err(AssemblyError::NoPages {
                    name: output.display().to_string(),
                })
            }
        }

        let dir = tempdir().unwrap();
        let mut pipeline = Pipeline::new(
            full_site(),
            Box::new(FailingAssembler),
            quick_config(dir.path().to_path_buf()),
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        // Chapters still count as completed; staged pages survive for a
        // later retry
        assert_eq!(summary.chapters_completed, 2);
        let staged = dir.path().join("Test Work").join("Chapter 1");
        assert!(staged.join("page_001.jpg").exists());
    }

    #[tokio::test]
    async fn test_resume_skips_existing_pages() {
        let dir = tempdir().unwrap();
        let work_dir = dir.path().join("Test Work").join("Chapter 1");
        tokio::fs::create_dir_all(&work_dir).await.unwrap();
        tokio::fs::write(work_dir.join("page_001.jpg"), b"from an earlier run")
            .await
            .unwrap();

        let mut config = quick_config(dir.path().to_path_buf());
        config.max_chapters = Some(1);
        config.keep_pages = true;

        let mut pipeline = Pipeline::new(
            full_site(),
            Box::new(CbzAssembler),
            config,
            CancellationToken::new(),
        );

        let url = Url::parse("https://site.test/work/my-title").unwrap();
        let summary = pipeline.run(&url).await.unwrap();

        assert_eq!(summary.pages_verified, 2);
        // The pre-existing file was not re-fetched
        let body = tokio::fs::read(work_dir.join("page_001.jpg")).await.unwrap();
        assert_eq!(body, b"from an earlier run");
    }
}
