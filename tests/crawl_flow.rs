//! Crawl pipeline tests against a local mock server.
//!
//! These drive the real HTTP client (retry decorator included) and the
//! crawl orchestrator end to end: search pagination, detail enrichment,
//! artifact writes, and cross-source deduplication.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use news_harvest::error::ParseShapeError;
use news_harvest::fetch::{FetchClient, FetchPage, RetryFetch, RetryPolicy, http_client};
use news_harvest::models::{NewsItem, UNKNOWN_PUBLISHED};
use news_harvest::orchestrator::{self, CrawlOptions};
use news_harvest::search::{SearchLimits, search};
use news_harvest::sources::{NewsSource, SearchHit, SourceId};

/// Test source served by a wiremock instance. Its search pages are JSON
/// arrays of `{url, title, published}` rows.
struct LocalSource {
    label: String,
    base: String,
    route: String,
}

impl LocalSource {
    fn new(server: &MockServer, label: &str, route: &str) -> Self {
        Self {
            label: label.to_string(),
            base: server.uri(),
            route: route.to_string(),
        }
    }
}

impl NewsSource for LocalSource {
    fn id(&self) -> SourceId {
        SourceId::Xinhua
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn base_url(&self) -> &str {
        &self.base
    }

    fn search_url(&self, keyword: &str, page: u32) -> String {
        format!("{}{}?kw={keyword}&page={page}", self.base, self.route)
    }

    fn parse_search_page(&self, body: &str) -> Result<Vec<SearchHit>, ParseShapeError> {
        let rows: Vec<Value> = serde_json::from_str(body).map_err(|_| ParseShapeError)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(SearchHit {
                    url: row.get("url")?.as_str()?.to_string(),
                    title: row.get("title").and_then(Value::as_str).map(str::to_string),
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

fn fast_client() -> RetryFetch<FetchClient> {
    http_client(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
    })
    .unwrap()
}

fn fast_limits() -> SearchLimits {
    SearchLimits {
        max_results: 100,
        item_delay: Duration::ZERO,
        page_delay: Duration::ZERO,
    }
}

async fn mount_listing(server: &MockServer, route: &str, page: u32, rows: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_writes_artifacts_and_dedups_the_aggregate() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        "/search-a",
        1,
        json!([
            {"url": "/a.html", "title": "甲文", "published": "2025-08-01"},
            {"url": "/shared.html", "title": "共文"},
        ]),
    )
    .await;
    mount_listing(&server, "/search-a", 2, json!([])).await;
    mount_listing(
        &server,
        "/search-b",
        1,
        json!([
            {"url": "/shared.html", "title": "共文"},
            {"url": "/b.html", "title": "乙文"},
        ]),
    )
    .await;
    mount_listing(&server, "/search-b", 2, json!([])).await;
    mount_detail(&server, "/a.html", "甲文正文").await;
    mount_detail(&server, "/b.html", "乙文正文").await;
    mount_detail(&server, "/shared.html", "共同正文").await;

    let news_dir = tempfile::tempdir().unwrap();
    let client = Arc::new(fast_client());
    let a = LocalSource::new(&server, "甲源", "/search-a");
    let b = LocalSource::new(&server, "乙源", "/search-b");
    let sources: Vec<&dyn NewsSource> = vec![&a, &b];
    let options = CrawlOptions {
        workers: 2,
        limits: fast_limits(),
    };

    let items = orchestrator::run(
        client,
        &["演习".to_string()],
        &sources,
        news_dir.path(),
        &options,
    )
    .await
    .unwrap();

    // Both sources listed /shared.html; the aggregate keeps it once.
    assert_eq!(items.len(), 3);
    let shared_link = format!("{}/shared.html", server.uri());
    let shared_count = items.iter().filter(|i| i.link == shared_link).count();
    assert_eq!(shared_count, 1);

    let a_item = items.iter().find(|i| i.link.ends_with("/a.html")).unwrap();
    assert_eq!(a_item.title, "甲文");
    assert_eq!(a_item.published, "2025-08-01");
    assert_eq!(a_item.keyword, "演习");
    assert_eq!(a_item.source, "甲源");
    assert_eq!(a_item.content.as_deref(), Some("甲文正文"));

    let shared = items.iter().find(|i| i.link == shared_link).unwrap();
    assert_eq!(shared.published, UNKNOWN_PUBLISHED);

    // Artifacts are written per task, pre-dedup, under {keyword}_{label}.json.
    let artifact_a = orchestrator::artifact_path(news_dir.path(), "演习", "甲源");
    let records_a: Vec<NewsItem> =
        serde_json::from_str(&std::fs::read_to_string(&artifact_a).unwrap()).unwrap();
    assert_eq!(records_a.len(), 2);
    assert_eq!(records_a[0].source, "甲源");

    let artifact_b = orchestrator::artifact_path(news_dir.path(), "演习", "乙源");
    let records_b: Vec<NewsItem> =
        serde_json::from_str(&std::fs::read_to_string(&artifact_b).unwrap()).unwrap();
    assert_eq!(records_b.len(), 2);
}

#[tokio::test]
async fn test_a_dark_source_still_leaves_the_other_artifacts() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        "/search-a",
        1,
        json!([{"url": "/a.html", "title": "甲文"}]),
    )
    .await;
    mount_listing(&server, "/search-a", 2, json!([])).await;
    mount_detail(&server, "/a.html", "甲文正文").await;
    // /search-b is never mounted, so that source 404s until the retry
    // budget runs out.

    let news_dir = tempfile::tempdir().unwrap();
    let client = Arc::new(fast_client());
    let a = LocalSource::new(&server, "甲源", "/search-a");
    let b = LocalSource::new(&server, "乙源", "/search-b");
    let sources: Vec<&dyn NewsSource> = vec![&a, &b];
    let options = CrawlOptions {
        workers: 2,
        limits: fast_limits(),
    };

    let items = orchestrator::run(
        client,
        &["演习".to_string()],
        &sources,
        news_dir.path(),
        &options,
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, "甲源");

    // The dark source still writes its (empty) artifact.
    let artifact_b = orchestrator::artifact_path(news_dir.path(), "演习", "乙源");
    let raw = std::fs::read_to_string(&artifact_b).unwrap();
    assert_eq!(raw.trim(), "[]");
}

#[tokio::test]
async fn test_transient_search_errors_recover_within_the_budget() {
    let server = MockServer::start().await;

    // First hit on page 1 is a 503; the retry sees the real listing.
    Mock::given(method("GET"))
        .and(path("/search-a"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_listing(
        &server,
        "/search-a",
        1,
        json!([{"url": "/a.html", "title": "甲文"}]),
    )
    .await;
    mount_listing(&server, "/search-a", 2, json!([])).await;
    mount_detail(&server, "/a.html", "甲文正文").await;

    let client = fast_client();
    let source = LocalSource::new(&server, "甲源", "/search-a");

    let items = search(&client, &source, "演习", &fast_limits()).await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].content.as_deref(), Some("甲文正文"));
}

#[tokio::test]
async fn test_challenge_interstitials_exhaust_the_retry_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search-a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html>请完成安全验证后继续访问</html>"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = http_client(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::ZERO,
    })
    .unwrap();
    let source = LocalSource::new(&server, "甲源", "/search-a");

    let items = search(&client, &source, "演习", &fast_limits()).await;

    // The interstitial is never surfaced as content; the walk just ends.
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_source_header_overrides_reach_the_wire() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/getNews"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let client = fast_client();
    let url = format!("{}/getNews", server.uri());
    client
        .fetch(Method::GET, &url, Some(SourceId::Xinhua), &[])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let headers = &requests[0].headers;
    assert_eq!(
        headers.get("referer").unwrap().to_str().unwrap(),
        "http://so.news.cn/"
    );
    assert_eq!(
        headers.get("accept-language").unwrap().to_str().unwrap(),
        "zh-CN,zh;q=0.9,en;q=0.8"
    );
    let ua = headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(ua.starts_with("Mozilla/5.0"));
}
