//! Cascading-selector extraction over fetched documents
//!
//! A rule table is an ordered list of [`ExtractionRule`]s, biased from the
//! most page-template-specific selector to the most generic fallback. The
//! evaluator tries rules strictly in order and the first rule producing at
//! least one post-validation match wins; later rules are never consulted,
//! even if they would match more elements. An empty result is a normal,
//! representable outcome, never an error.
//!
//! The three rule tables used by the pipeline (work title, chapter list,
//! page images) live here so the cascade logic is written once and reused.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Where a rule reads its primary value from, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// An element attribute, e.g. `href`, `src`, `data-src`
    Attr(&'static str),
    /// The element's collected text content
    Text,
}

/// A structural query plus its value-extraction fallback chain
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRule {
    /// CSS selector identifying candidate elements
    pub selector: &'static str,
    /// Value sources tried in order on each matched element
    pub sources: &'static [ValueSource],
}

/// One post-validation match from a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Primary extracted value (href, image source, or text)
    pub value: String,
    /// Collected element text, if any
    pub text: Option<String>,
    /// `title` attribute, if present
    pub title_attr: Option<String>,
}

/// Rule table for the work title, most specific first
pub const TITLE_RULES: &[ExtractionRule] = &[
    rule("h1.project__content-informations-title", TEXT_ONLY),
    rule("h1.entry-title", TEXT_ONLY),
    rule("h1.manga-title", TEXT_ONLY),
    rule("h1.post-title", TEXT_ONLY),
    rule("div.post-title h1", TEXT_ONLY),
    rule("header.entry-header h1", TEXT_ONLY),
    rule("h1", TEXT_ONLY),
    rule(".manga-title", TEXT_ONLY),
    rule(".entry-title", TEXT_ONLY),
];

/// Rule table for chapter anchors on the work's root page
pub const CHAPTER_RULES: &[ExtractionRule] = &[
    rule(".project__chapters a.project__chapter.unstyled-link", HREF_ONLY),
    rule(".project__chapters a", HREF_ONLY),
    rule("a.project__chapter", HREF_ONLY),
    rule(".wp-manga-chapter a", HREF_ONLY),
    rule(".listing-chapters_wrap a", HREF_ONLY),
    rule(".chapter-list a", HREF_ONLY),
    rule(".chapter-link", HREF_ONLY),
    rule("a[href*='chapter']", HREF_ONLY),
    rule("a[href*='chapitre']", HREF_ONLY),
    rule("li a[href*='chapter']", HREF_ONLY),
    rule("li a[href*='chapitre']", HREF_ONLY),
];

/// Rule table for page images on a chapter page.
///
/// Deferred-loading attributes take priority over the literal `src` so
/// lazy-loaded markup resolves to the real image instead of a placeholder.
pub const IMAGE_RULES: &[ExtractionRule] = &[
    rule(".reading-content img", IMG_SOURCES),
    rule(".chapter-images img", IMG_SOURCES),
    rule(".chapter-content img", IMG_SOURCES),
    rule(".manga-reader img", IMG_SOURCES),
    rule(".wp-manga-chapter-img", IMG_SOURCES),
    rule(".page-break img", IMG_SOURCES),
    rule("img[src*='uploads']", IMG_SOURCES),
    rule("img[data-src]", IMG_SOURCES),
    rule("img", IMG_SOURCES),
];

const TEXT_ONLY: &[ValueSource] = &[ValueSource::Text];
const HREF_ONLY: &[ValueSource] = &[ValueSource::Attr("href")];
const IMG_SOURCES: &[ValueSource] = &[
    ValueSource::Attr("data-src"),
    ValueSource::Attr("data-lazy-src"),
    ValueSource::Attr("src"),
];

const fn rule(selector: &'static str, sources: &'static [ValueSource]) -> ExtractionRule {
    ExtractionRule { selector, sources }
}

/// Evaluate a rule table against a document.
///
/// Returns the post-validation matches of the first rule with at least one,
/// or an empty vector when no rule matches anything acceptable.
pub fn evaluate<F>(html: &Html, rules: &[ExtractionRule], validate: F) -> Vec<Candidate>
where
    F: Fn(&Candidate) -> bool,
{
    for extraction_rule in rules {
        let selector = match Selector::parse(extraction_rule.selector) {
            Ok(s) => s,
            Err(_) => {
                // Rule tables are static; a bad selector is a programming
                // error but must not sink the whole cascade.
                warn!(selector = extraction_rule.selector, "skipping unparsable selector");
                continue;
            }
        };

        let matches: Vec<Candidate> = html
            .select(&selector)
            .filter_map(|element| extract_candidate(element, extraction_rule.sources))
            .filter(|candidate| validate(candidate))
            .collect();

        debug!(
            selector = extraction_rule.selector,
            matches = matches.len(),
            "cascade rule evaluated"
        );

        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

/// Pull the primary value out of a matched element using the rule's
/// fallback chain; elements yielding no value are dropped.
fn extract_candidate(element: ElementRef<'_>, sources: &[ValueSource]) -> Option<Candidate> {
    let text = collected_text(element);
    let title_attr = element
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    let value = sources.iter().find_map(|source| match source {
        ValueSource::Attr(name) => element
            .value()
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from),
        ValueSource::Text => text.clone(),
    })?;

    Some(Candidate {
        value,
        text,
        title_attr,
    })
}

fn collected_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
