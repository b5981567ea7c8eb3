//! Listing resolution
//!
//! Turns the work's root page into an ordered, deduplicated chapter list
//! and a chapter page into its ordered page-image sequence, using the
//! selector cascade over fetched documents. Absence of content is a normal
//! outcome here; only an unreachable root listing is an error.

use std::collections::HashSet;

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::extract::{evaluate, Candidate, CHAPTER_RULES, IMAGE_RULES, TITLE_RULES};
use crate::app::fetch::Fetch;
use crate::app::models::{is_image_url, sanitize_filename, sort_chapters, Chapter, PageImage};
use crate::constants::placeholders;
use crate::errors::ScrapeError;

/// Resolves listings through a fetcher it borrows for the duration
pub struct ListingResolver<'a, F: Fetch> {
    fetcher: &'a mut F,
}

impl<'a, F: Fetch> ListingResolver<'a, F> {
    pub fn new(fetcher: &'a mut F) -> Self {
        Self { fetcher }
    }

    /// Resolve the work title, falling back to the last URL path segment
    /// and finally a literal placeholder. Never fails the run.
    pub async fn resolve_title(&mut self, work_url: &Url) -> String {
        match self.fetcher.fetch(work_url).await {
            Ok(result) => {
                let title = title_from_html(&result.text());
                match title {
                    Some(t) => t,
                    None => fallback_title(work_url),
                }
            }
            Err(e) => {
                warn!("title page fetch failed, using fallback title: {}", e);
                fallback_title(work_url)
            }
        }
    }

    /// Resolve the ordered, deduplicated chapter list.
    ///
    /// An empty list is "no work found", a normal terminal state. Only a
    /// fetch failure on the root page itself is an error, since nothing
    /// downstream can proceed without it.
    pub async fn resolve_chapters(&mut self, work_url: &Url) -> Result<Vec<Chapter>, ScrapeError> {
        let result = self
            .fetcher
            .fetch(work_url)
            .await
            .map_err(|e| {
                warn!("chapter listing fetch failed: {}", e);
                ScrapeError::ListingUnreachable {
                    url: work_url.to_string(),
                }
            })?;

        let chapters = chapters_from_html(&result.text(), work_url);
        info!("resolved {} unique chapters", chapters.len());
        for (i, chapter) in chapters.iter().take(5).enumerate() {
            debug!(
                "  {}. {} -> {}",
                i + 1,
                chapter.display_name,
                chapter.source_url
            );
        }
        Ok(chapters)
    }

    /// Resolve a chapter's ordered page images.
    ///
    /// A failed chapter fetch yields an empty sequence rather than an
    /// error; the chapter is simply skipped by the pipeline.
    pub async fn resolve_pages(&mut self, chapter_url: &Url) -> Vec<PageImage> {
        match self.fetcher.fetch(chapter_url).await {
            Ok(result) => {
                let pages = pages_from_html(&result.text(), chapter_url);
                info!("resolved {} page images", pages.len());
                pages
            }
            Err(e) => {
                warn!("chapter page fetch failed, skipping: {}", e);
                Vec::new()
            }
        }
    }
}

/// Run the title cascade over a document
pub fn title_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let matches = evaluate(&document, TITLE_RULES, |c| !c.value.trim().is_empty());
    matches.first().map(|c| sanitize_filename(&c.value))
}

/// Run the chapter cascade over the root document: resolve hrefs against
/// the base URL, derive display names, deduplicate by resolved URL (first
/// occurrence wins) and sort ascending by sequence key.
pub fn chapters_from_html(html: &str, base: &Url) -> Vec<Chapter> {
    let document = Html::parse_document(html);
    let matches = evaluate(&document, CHAPTER_RULES, |c| {
        let lower = c.value.to_lowercase();
        lower.contains("chapter") || lower.contains("chapitre")
    });

    let mut seen = HashSet::new();
    let mut chapters = Vec::new();
    for candidate in matches {
        let resolved = match base.join(&candidate.value) {
            Ok(url) => url,
            Err(e) => {
                debug!("dropping unresolvable href {}: {}", candidate.value, e);
                continue;
            }
        };
        if !seen.insert(resolved.to_string()) {
            continue;
        }
        let name = display_name(&candidate, &resolved);
        chapters.push(Chapter::new(&name, resolved));
    }

    sort_chapters(&mut chapters);
    chapters
}

/// Run the image cascade over a chapter document, admitting only URLs that
/// pass the image-likeness predicate, in document order with 1-based
/// ordinals.
pub fn pages_from_html(html: &str, base: &Url) -> Vec<PageImage> {
    let document = Html::parse_document(html);
    let matches = evaluate(&document, IMAGE_RULES, |c| is_image_url(&c.value));

    matches
        .into_iter()
        .filter_map(|candidate| base.join(&candidate.value).ok())
        .enumerate()
        .map(|(i, source_url)| PageImage {
            ordinal: i + 1,
            source_url,
        })
        .collect()
}

/// Display-name fallback chain: link text, then `title` attribute, then
/// the last path segment of the resolved URL, then a placeholder.
fn display_name(candidate: &Candidate, resolved: &Url) -> String {
    if let Some(text) = &candidate.text {
        return text.clone();
    }
    if let Some(title) = &candidate.title_attr {
        return title.clone();
    }
    resolved
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(String::from)
        .unwrap_or_else(|| placeholders::UNKNOWN_CHAPTER.to_string())
}

fn fallback_title(work_url: &Url) -> String {
    work_url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(sanitize_filename)
        .unwrap_or_else(|| placeholders::UNKNOWN_WORK.to_string())
}
