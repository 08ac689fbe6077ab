//! Keyword search pagination over one news source.
//!
//! [`search`] walks a source's paged results for one keyword and returns
//! enriched [`NewsItem`]s in page-then-item order. The walk is bounded by
//! `max_results` and ends early on any of:
//!
//! | Condition | Meaning |
//! |-----------|---------|
//! | Search-page fetch fails after retries | partial results returned |
//! | Two unrecognized pages in a row | layout changed or we are blocked |
//! | Recognized page adds nothing new | end of results |
//!
//! A single unrecognized page is tolerated and skipped, since search front
//! ends occasionally serve a one-off error body. Detail-page enrichment is
//! best-effort: when a detail fetch fails the item keeps its search-listing
//! metadata. Pacing delays between items and pages are carried in
//! [`SearchLimits`] so tests can zero them.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Method;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::fetch::FetchPage;
use crate::models::{NewsItem, UNKNOWN_PUBLISHED, UNTITLED};
use crate::sources::NewsSource;

/// At most this many newly accepted items per results page; both sources
/// serve ten hits a page, so anything past ten is a parser artifact.
const PER_PAGE_CAP: usize = 10;

/// Consecutive unrecognized pages before the walk gives up.
const MAX_SHAPE_MISSES: u32 = 2;

/// Caps and pacing for one search walk.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Stop once this many items have been accepted (a cap, not a goal).
    pub max_results: usize,
    /// Pause between detail fetches on one page.
    pub item_delay: Duration,
    /// Pause between results pages.
    pub page_delay: Duration,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_results: 100,
            item_delay: Duration::from_secs(1),
            page_delay: Duration::from_secs(2),
        }
    }
}

/// Walk the source's paged search results for `keyword`.
///
/// Every termination path returns the items accepted so far; a failing
/// search walk is a shorter one, never an error.
#[instrument(level = "info", skip_all, fields(source = %source.label(), keyword = %keyword))]
pub async fn search<F>(
    client: &F,
    source: &dyn NewsSource,
    keyword: &str,
    limits: &SearchLimits,
) -> Vec<NewsItem>
where
    F: FetchPage,
{
    let mut items: Vec<NewsItem> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut page: u32 = 1;
    let mut shape_misses: u32 = 0;

    while items.len() < limits.max_results {
        let listing_url = source.search_url(keyword, page);
        let listing = match client
            .fetch(Method::GET, &listing_url, Some(source.id()), &[])
            .await
        {
            Ok(listing) => listing,
            Err(e) => {
                warn!(page, error = %e, "Search page fetch failed; returning partial results");
                break;
            }
        };

        let hits = match source.parse_search_page(&listing.body) {
            Ok(hits) => {
                shape_misses = 0;
                hits
            }
            Err(_) => {
                shape_misses += 1;
                if shape_misses >= MAX_SHAPE_MISSES {
                    warn!(page, "Second unrecognized results page in a row; stopping");
                    break;
                }
                warn!(page, "Unrecognized results page shape; skipping page");
                page += 1;
                sleep(limits.page_delay).await;
                continue;
            }
        };

        let mut accepted = 0usize;
        for hit in hits {
            if items.len() >= limits.max_results || accepted >= PER_PAGE_CAP {
                break;
            }
            let Some(link) = source.resolve_url(&hit.url) else {
                debug!(raw = %hit.url, "Skipping unresolvable result URL");
                continue;
            };
            if !visited.insert(link.clone()) {
                continue;
            }

            let mut item = NewsItem {
                title: non_empty_or(hit.title.as_deref(), UNTITLED),
                link: link.clone(),
                source: source.label().to_string(),
                published: non_empty_or(hit.published.as_deref(), UNKNOWN_PUBLISHED),
                keyword: keyword.to_string(),
                content: None,
            };

            match client
                .fetch(Method::GET, &link, Some(source.id()), &[])
                .await
            {
                Ok(detail) => source.enrich_from_detail(&mut item, &detail.body),
                Err(e) => {
                    warn!(url = %link, error = %e, "Detail fetch failed; keeping listing metadata");
                }
            }

            items.push(item);
            accepted += 1;
            sleep(limits.item_delay).await;
        }

        if accepted == 0 {
            debug!(page, "Results page yielded nothing new");
            break;
        }

        debug!(page, accepted, total = items.len(), "Results page processed");
        page += 1;
        sleep(limits.page_delay).await;
    }

    info!(total = items.len(), last_page = page, "Search finished");
    items
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;
    use serde_json::Value;

    use crate::error::{FetchError, ParseShapeError};
    use crate::fetch::FetchedPage;
    use crate::sources::{SearchHit, SourceId};

    /// Source whose listings are plain JSON arrays of `{url, title, published}`.
    struct PlainSource;

    impl NewsSource for PlainSource {
        fn id(&self) -> SourceId {
            SourceId::Xinhua
        }

        fn label(&self) -> &str {
            "测试源"
        }

        fn base_url(&self) -> &str {
            "https://test.invalid/"
        }

        fn search_url(&self, keyword: &str, page: u32) -> String {
            format!("https://test.invalid/search?kw={keyword}&page={page}")
        }

        fn parse_search_page(&self, body: &str) -> Result<Vec<SearchHit>, ParseShapeError> {
            let rows: Vec<Value> = serde_json::from_str(body).map_err(|_| ParseShapeError)?;
            Ok(rows
                .iter()
                .filter_map(|row| {
                    Some(SearchHit {
                        url: row.get("url")?.as_str()?.to_string(),
                        title: row
                            .get("title")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        published: row
                            .get("published")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect())
        }

        fn enrich_from_detail(&self, item: &mut NewsItem, detail_html: &str) {
            let body = detail_html.trim();
            if !body.is_empty() {
                item.content = Some(body.to_string());
            }
        }
    }

    /// Fetcher answering from a fixed url-to-body map; unknown URLs 404.
    #[derive(Debug, Default)]
    struct ScriptedFetch {
        pages: HashMap<String, String>,
        log: Mutex<Vec<String>>,
    }

    impl ScriptedFetch {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        fn requested(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl FetchPage for ScriptedFetch {
        async fn fetch(
            &self,
            _method: Method,
            url: &str,
            _source: Option<SourceId>,
            _extra_headers: &[(&str, &str)],
        ) -> Result<FetchedPage, FetchError> {
            self.log.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(FetchedPage {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: body.clone(),
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: StatusCode::NOT_FOUND,
                }),
            }
        }
    }

    fn fast_limits() -> SearchLimits {
        SearchLimits {
            max_results: 100,
            item_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
        }
    }

    fn listing_url(page: u32) -> String {
        PlainSource.search_url("演习", page)
    }

    #[test]
    fn test_default_limits() {
        let limits = SearchLimits::default();
        assert_eq!(limits.max_results, 100);
        assert_eq!(limits.item_delay, Duration::from_secs(1));
        assert_eq!(limits.page_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_walk_ends_on_an_empty_page() {
        let client = ScriptedFetch::default()
            .with(
                &listing_url(1),
                r#"[{"url": "/a.html", "title": "甲", "published": "2025-05-06"},
                   {"url": "/b.html"}]"#,
            )
            .with("https://test.invalid/a.html", "甲文正文")
            .with(&listing_url(2), "[]");

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "甲");
        assert_eq!(items[0].published, "2025-05-06");
        assert_eq!(items[0].link, "https://test.invalid/a.html");
        assert_eq!(items[0].source, "测试源");
        assert_eq!(items[0].keyword, "演习");
        assert_eq!(items[0].content.as_deref(), Some("甲文正文"));
        // Detail 404s keep the listing metadata and the placeholders.
        assert_eq!(items[1].title, UNTITLED);
        assert_eq!(items[1].published, UNKNOWN_PUBLISHED);
        assert_eq!(items[1].content, None);
    }

    #[tokio::test]
    async fn test_per_page_cap_accepts_at_most_ten() {
        let rows: Vec<String> = (0..14)
            .map(|i| format!(r#"{{"url": "/item{i}.html"}}"#))
            .collect();
        let client = ScriptedFetch::default()
            .with(&listing_url(1), &format!("[{}]", rows.join(",")))
            .with(&listing_url(2), "[]");

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        assert_eq!(items.len(), 10);
        assert_eq!(items[9].link, "https://test.invalid/item9.html");
    }

    #[tokio::test]
    async fn test_max_results_stops_the_walk_mid_page() {
        let client = ScriptedFetch::default().with(
            &listing_url(1),
            r#"[{"url": "/a.html"}, {"url": "/b.html"}, {"url": "/c.html"},
               {"url": "/d.html"}]"#,
        );
        let limits = SearchLimits {
            max_results: 3,
            ..fast_limits()
        };

        let items = search(&client, &PlainSource, "演习", &limits).await;

        assert_eq!(items.len(), 3);
        // Page 2 is never requested once the cap is hit.
        assert!(!client.requested().contains(&listing_url(2)));
    }

    #[tokio::test]
    async fn test_repeats_across_pages_are_accepted_once() {
        let client = ScriptedFetch::default()
            .with(&listing_url(1), r#"[{"url": "/a.html"}, {"url": "/b.html"}]"#)
            .with(&listing_url(2), r#"[{"url": "/b.html"}, {"url": "/c.html"}]"#)
            .with(&listing_url(3), "[]");

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        let links: Vec<&str> = items.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://test.invalid/a.html",
                "https://test.invalid/b.html",
                "https://test.invalid/c.html",
            ]
        );
    }

    #[tokio::test]
    async fn test_one_unrecognized_page_is_skipped() {
        let client = ScriptedFetch::default()
            .with(&listing_url(1), "<html>error page</html>")
            .with(&listing_url(2), r#"[{"url": "/a.html"}]"#)
            .with(&listing_url(3), "[]");

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://test.invalid/a.html");
    }

    #[tokio::test]
    async fn test_two_unrecognized_pages_in_a_row_stop_the_walk() {
        let client = ScriptedFetch::default()
            .with(&listing_url(1), r#"[{"url": "/a.html"}]"#)
            .with(&listing_url(2), "<html>error page</html>")
            .with(&listing_url(3), "<html>error page</html>")
            .with(&listing_url(4), r#"[{"url": "/never.html"}]"#);

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        assert_eq!(items.len(), 1);
        assert!(!client.requested().contains(&listing_url(4)));
    }

    #[tokio::test]
    async fn test_listing_fetch_failure_returns_partial_results() {
        let client = ScriptedFetch::default()
            .with(&listing_url(1), r#"[{"url": "/a.html"}]"#);

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://test.invalid/a.html");
    }

    #[tokio::test]
    async fn test_unresolvable_urls_are_skipped() {
        let client = ScriptedFetch::default()
            .with(
                &listing_url(1),
                r#"[{"url": "mailto:editor@test.invalid"}, {"url": "/a.html"}]"#,
            )
            .with(&listing_url(2), "[]");

        let items = search(&client, &PlainSource, "演习", &fast_limits()).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://test.invalid/a.html");
    }
}
