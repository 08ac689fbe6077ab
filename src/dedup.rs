//! Canonical-URL deduplication for the aggregate crawl result.
//!
//! Two hits are the same article when their links agree after the query
//! string and fragment are stripped. The crawl keeps tracking parameters in
//! the persisted artifacts (raw provenance) and dedups only the in-memory
//! aggregate, first-seen-wins.

use itertools::Itertools;
use url::Url;

use crate::models::NewsItem;

/// The deduplication key for a link: the URL with query and fragment
/// removed. Total: input that does not parse as a URL falls back to
/// truncation at the first `?` or `#`.
pub fn canonical_key(link: &str) -> String {
    match Url::parse(link) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => {
            let cut = link.find(['?', '#']).unwrap_or(link.len());
            link[..cut].to_string()
        }
    }
}

/// Drop later items whose canonical link was already seen, preserving the
/// order of first appearance.
pub fn dedup_by_canonical_link(items: Vec<NewsItem>) -> Vec<NewsItem> {
    items
        .into_iter()
        .unique_by(|item| canonical_key(&item.link))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: &str) -> NewsItem {
        NewsItem {
            title: "标题".to_string(),
            link: link.to_string(),
            source: "新华网".to_string(),
            published: "未知时间".to_string(),
            keyword: "军演".to_string(),
            content: None,
        }
    }

    #[test]
    fn test_canonical_key_strips_query_and_fragment() {
        let plain = canonical_key("https://www.news.cn/a.html");
        assert_eq!(
            canonical_key("https://www.news.cn/a.html?x=1#frag"),
            plain
        );
        assert_eq!(canonical_key("https://www.news.cn/a.html#only"), plain);
        assert_eq!(canonical_key("https://www.news.cn/a.html?a=b&c=d"), plain);
    }

    #[test]
    fn test_canonical_key_is_total_on_non_urls() {
        assert_eq!(canonical_key("not a url?tracking=1"), "not a url");
        assert_eq!(canonical_key("fragment#only"), "fragment");
        assert_eq!(canonical_key(""), "");
    }

    #[test]
    fn test_dedup_first_seen_wins() {
        let mut first = item("https://www.news.cn/a.html?from=search");
        first.title = "先到".to_string();
        let mut second = item("https://www.news.cn/a.html");
        second.title = "后到".to_string();
        let third = item("https://www.news.cn/b.html");

        let kept = dedup_by_canonical_link(vec![first, second, third]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "先到");
        assert_eq!(kept[1].link, "https://www.news.cn/b.html");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let items = vec![
            item("https://www.news.cn/a.html?x=1"),
            item("https://www.news.cn/a.html#frag"),
            item("https://www.news.cn/b.html"),
            item("https://www.news.cn/c.html?utm=xinhua"),
        ];
        let once = dedup_by_canonical_link(items);
        let twice = dedup_by_canonical_link(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dedup_keeps_distinct_paths() {
        let items = vec![
            item("https://www.news.cn/a.html"),
            item("https://www.news.cn/a/index.html"),
        ];
        assert_eq!(dedup_by_canonical_link(items).len(), 2);
    }
}
