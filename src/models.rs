//! Data models for crawled news and persisted article artifacts.
//!
//! This module defines the core data structures used throughout the crawl
//! pipeline:
//! - [`NewsItem`]: One search hit, enriched from its detail page
//! - [`ArticleRecord`]: A row read back from a crawl artifact for persisting
//! - [`ExtractedContent`]: The extractor's view of one article page
//! - [`ArticleBundle`]: The on-disk result of persisting one article
//!
//! Serialized field names match the JSON artifacts the downstream analysis
//! stages already consume (`title`, `link`, `source`, `published`,
//! `keyword`, `content`), so artifacts stay drop-in compatible.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder title for hits whose pages carry no usable headline.
pub const UNTITLED: &str = "无标题";

/// Placeholder for hits whose publication date could not be determined.
pub const UNKNOWN_PUBLISHED: &str = "未知时间";

/// One news search hit.
///
/// Created while parsing a search results page, then enriched in the same
/// pass with the detail page's title, publication date, and body text when
/// those are present. Immutable once appended to a task's result list.
///
/// `link` holds the resolved absolute URL; deduplication compares links in
/// canonical form (query string and fragment stripped), not verbatim.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NewsItem {
    /// Headline, or [`UNTITLED`] when the source offered none.
    pub title: String,
    /// Resolved absolute URL of the article page.
    pub link: String,
    /// Human-readable label of the source site (e.g. `新华网`).
    pub source: String,
    /// Free-text publication date as the source printed it.
    pub published: String,
    /// The search keyword that produced this hit.
    pub keyword: String,
    /// Body text from the detail page, when extraction found any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One row of a crawl artifact, as consumed by the article persister.
///
/// Artifacts written by older runs (or by hand) may carry extra fields;
/// those are preserved in `extra` and otherwise ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArticleRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    /// Any remaining artifact fields, carried opaquely.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ArticleRecord {
    /// The record's link, if present and non-blank.
    pub fn usable_link(&self) -> Option<&str> {
        self.link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// The record's title, or the untitled placeholder.
    pub fn title_or_placeholder(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
    }
}

/// The extractor's output for one article page.
///
/// Total by construction: extraction failures produce the all-empty value
/// rather than an error, so a bad page never aborts the surrounding run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    /// Main-body text, noise-stripped and whitespace-normalized.
    pub raw_text: String,
    /// CJK-and-punctuation subset of `raw_text`, for consumers sensitive to
    /// mixed-script contamination.
    pub filtered_text: String,
    /// Absolute in-body image URLs, in document order.
    pub image_urls: Vec<String>,
}

impl ExtractedContent {
    /// True when extraction found neither text nor images.
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty() && self.filtered_text.is_empty() && self.image_urls.is_empty()
    }
}

/// The on-disk artifact of one persisted article.
#[derive(Debug, Clone)]
pub struct ArticleBundle {
    /// Directory holding this article's files.
    pub article_dir: PathBuf,
    /// The labeled `content.txt` inside `article_dir`.
    pub text_file: PathBuf,
    /// Downloaded images under `article_dir/images`, in discovery order.
    pub image_files: Vec<PathBuf>,
}
