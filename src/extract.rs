//! Main-body content extraction from article pages.
//!
//! Given raw markup and the page URL, [`extract`] locates the article's
//! prose container, strips boilerplate, and produces an
//! [`ExtractedContent`]: normalized body text, a CJK-only filtered view,
//! and the in-body image URLs resolved to absolute form.
//!
//! Container discovery is a data-driven chain: the structural selectors in
//! [`CONTAINER_CHAIN`] are tried in order, and when none match, the page is
//! scanned for the `div` with the most paragraph descendants (more than 5
//! required). Noise subtrees are excluded before any text is serialized,
//! so removed-subtree text never leaks into the output.
//!
//! The function is total: malformed or empty markup yields the all-empty
//! value, never an error. One unreadable page must not abort a crawl.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::models::ExtractedContent;

/// Structural selectors tried in order when locating the prose container.
const CONTAINER_RULES: &[&str] = &["div.article", "div.content", "div#article", "div.article-content"];

/// Tag names whose subtrees are never part of article prose.
const NOISE_TAGS: &[&str] = &["script", "style", "iframe", "nav", "footer", "aside"];

/// Class tokens that mark ad/comment/share regions inside the container.
const NOISE_CLASS_TOKENS: &[&str] = &["ad", "comment", "recommend", "share"];

/// Everything from this marker on is correction-notice boilerplate.
const CORRECTION_MARKER: &str = "【纠错】";

/// Minimum paragraph count for the fallback container scan.
const FALLBACK_MIN_PARAGRAPHS: usize = 5;

static CONTAINER_CHAIN: Lazy<Vec<Selector>> = Lazy::new(|| {
    CONTAINER_RULES
        .iter()
        .map(|rule| Selector::parse(rule).expect("container rule is valid"))
        .collect()
});

static ANY_DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").expect("div selector"));
static ANY_PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Runs of CJK ideographs plus the punctuation Chinese news copy uses.
static CJK_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\u{4e00}-\u{9fa5}，。、；：？！""''（）《》【】…]+"#).expect("cjk pattern")
});

/// Extract body text and image URLs from an article page.
///
/// Total: returns the all-empty [`ExtractedContent`] when no container can
/// be found, and never panics on malformed markup.
pub fn extract(html: &str, base_url: &str) -> ExtractedContent {
    let document = Html::parse_document(html);

    let Some(container) = find_container(&document) else {
        warn!(base_url, "No content container found in page");
        return ExtractedContent::default();
    };

    let mut pieces = Vec::new();
    collect_text_nodes(container, &is_noise, &mut pieces);
    let raw_text = clean_text(&pieces.join("\n"));
    let filtered_text = filtered_runs(&raw_text);

    let mut image_urls = Vec::new();
    collect_images(container, base_url, &mut image_urls);

    ExtractedContent {
        raw_text,
        filtered_text,
        image_urls,
    }
}

/// Locate the prose container: selector chain first, then the
/// most-paragraphs `div` scan.
fn find_container<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    for selector in CONTAINER_CHAIN.iter() {
        if let Some(found) = document.select(selector).next() {
            return Some(found);
        }
    }

    // Fallback: the div holding the most paragraphs, first-wins on ties.
    let mut best: Option<(usize, ElementRef<'a>)> = None;
    for div in document.select(&ANY_DIV) {
        let count = div.select(&ANY_PARAGRAPH).count();
        if count > FALLBACK_MIN_PARAGRAPHS && best.map_or(true, |(c, _)| count > c) {
            best = Some((count, div));
        }
    }
    best.map(|(_, div)| div)
}

/// True for subtrees that hold chrome rather than prose.
fn is_noise(el: &ElementRef) -> bool {
    if NOISE_TAGS.contains(&el.value().name()) {
        return true;
    }
    el.value()
        .classes()
        .any(|class| NOISE_CLASS_TOKENS.contains(&class))
}

/// Depth-first text-node collection, skipping subtrees `skip` rejects.
fn collect_text_nodes<F>(el: ElementRef, skip: &F, out: &mut Vec<String>)
where
    F: Fn(&ElementRef) -> bool,
{
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push(text.to_string());
        } else if let Some(element) = ElementRef::wrap(child) {
            if !skip(&element) {
                collect_text_nodes(element, skip, out);
            }
        }
    }
}

/// Join the text of every paragraph under `root` with single spaces,
/// skipping `skip_tags` subtrees entirely. Used by source descriptors whose
/// detail pages keep prose strictly inside `<p>` elements.
pub(crate) fn paragraph_text(root: ElementRef, skip_tags: &[&str]) -> String {
    let mut paragraphs = Vec::new();
    collect_paragraphs(root, skip_tags, &mut paragraphs);
    paragraphs.join(" ")
}

fn collect_paragraphs(el: ElementRef, skip_tags: &[&str], out: &mut Vec<String>) {
    for child in el.children() {
        let Some(element) = ElementRef::wrap(child) else {
            continue;
        };
        let name = element.value().name();
        if skip_tags.contains(&name) {
            continue;
        }
        if name == "p" {
            let mut pieces = Vec::new();
            collect_text_nodes(
                element,
                &|e: &ElementRef| skip_tags.contains(&e.value().name()),
                &mut pieces,
            );
            let text = pieces.concat();
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        } else {
            collect_paragraphs(element, skip_tags, out);
        }
    }
}

/// Truncate correction boilerplate, collapse whitespace runs, trim.
pub(crate) fn clean_text(text: &str) -> String {
    let cut = match text.find(CORRECTION_MARKER) {
        Some(idx) => &text[..idx],
        None => text,
    };
    WHITESPACE_RUN.replace_all(cut, " ").trim().to_string()
}

/// The CJK-and-punctuation runs of `text`, joined with single spaces.
pub(crate) fn filtered_runs(text: &str) -> String {
    CJK_RUN
        .find_iter(text)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collect absolute, structurally valid image URLs under `el`, skipping
/// noise subtrees (an image inside an ad block is chrome, not content).
fn collect_images(el: ElementRef, base_url: &str, out: &mut Vec<String>) {
    let base = Url::parse(base_url).ok();
    collect_images_inner(el, base.as_ref(), out);
}

fn collect_images_inner(el: ElementRef, base: Option<&Url>, out: &mut Vec<String>) {
    for child in el.children() {
        let Some(element) = ElementRef::wrap(child) else {
            continue;
        };
        if is_noise(&element) {
            continue;
        }
        if element.value().name() == "img" {
            if let Some(src) = element.value().attr("src") {
                if !src.trim().is_empty() {
                    if let Some(absolute) = resolve_image_url(base, src) {
                        out.push(absolute);
                    }
                }
            }
        }
        collect_images_inner(element, base, out);
    }
}

/// Resolve `src` against the page URL; keep only http(s) URLs with a host.
fn resolve_image_url(base: Option<&Url>, src: &str) -> Option<String> {
    let resolved = match base {
        Some(base) => base.join(src).ok()?,
        None => Url::parse(src).ok()?,
    };
    let scheme_ok = resolved.scheme() == "http" || resolved.scheme() == "https";
    if scheme_ok && resolved.host_str().is_some() {
        Some(resolved.to_string())
    } else {
        None
    }
}
