//! 新华网 (Xinhua) descriptor.
//!
//! Search goes through the `so.news.cn` JSON API. Two response shapes are
//! in the wild: `content.results` as the hit array (possibly `null` once
//! the results run out), and older responses where `content` itself is the
//! array. Detail pages carry the real headline in `h1`, the publication
//! date inside `span.source` (label and date separated by `|`), and the
//! body under `div.content`.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::ParseShapeError;
use crate::extract::paragraph_text;
use crate::models::NewsItem;
use crate::sources::{NewsSource, SearchHit, SourceId};

const SEARCH_ENDPOINT: &str = "https://so.news.cn/getNews";
const BASE_URL: &str = "https://so.news.cn/";

/// The search front door rejects requests that arrive without its own
/// referer.
const HEADER_OVERRIDES: &[(&str, &str)] = &[("referer", "http://so.news.cn/")];

/// Tags stripped from the detail body before paragraph joining.
const DETAIL_SKIP_TAGS: &[&str] = &["script", "style", "iframe", "img", "video"];

static TITLE_H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static SOURCE_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.source").expect("span.source selector"));
static CONTENT_DIV: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.content").expect("div.content selector"));

pub struct Xinhua;

impl NewsSource for Xinhua {
    fn id(&self) -> SourceId {
        SourceId::Xinhua
    }

    fn label(&self) -> &str {
        "新华网"
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn header_overrides(&self) -> &'static [(&'static str, &'static str)] {
        HEADER_OVERRIDES
    }

    fn search_url(&self, keyword: &str, page: u32) -> String {
        format!(
            "{SEARCH_ENDPOINT}?keyword={}&curPage={page}&sortField=0&searchFields=1",
            urlencoding::encode(keyword)
        )
    }

    fn parse_search_page(&self, body: &str) -> Result<Vec<SearchHit>, ParseShapeError> {
        let data: Value = serde_json::from_str(body).map_err(|_| ParseShapeError)?;
        let content = data.get("content").ok_or(ParseShapeError)?;

        let items: &[Value] = if let Some(results) = content.get("results") {
            match results {
                Value::Array(array) => array.as_slice(),
                // A present-but-null results field is how the API says
                // "no more hits": recognized, empty.
                Value::Null => &[],
                _ => return Err(ParseShapeError),
            }
        } else if let Value::Array(array) = content {
            array.as_slice()
        } else {
            return Err(ParseShapeError);
        };

        Ok(items
            .iter()
            .filter_map(|item| {
                let url = item.get("url").and_then(Value::as_str)?.trim();
                if url.is_empty() {
                    return None;
                }
                Some(SearchHit {
                    url: url.to_string(),
                    title: item
                        .get("title")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    published: item
                        .get("pubtime")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect())
    }

    fn enrich_from_detail(&self, item: &mut NewsItem, detail_html: &str) {
        let document = Html::parse_document(detail_html);

        if let Some(h1) = document.select(&TITLE_H1).next() {
            let title = h1.text().collect::<String>();
            let title = title.trim();
            if !title.is_empty() {
                item.title = title.to_string();
            }
        }

        if let Some(span) = document.select(&SOURCE_SPAN).next() {
            let text = span.text().collect::<String>();
            if let Some((_, date_part)) = text.split_once('|') {
                let date_part = date_part.trim();
                if !date_part.is_empty() {
                    item.published = date_part.to_string();
                }
            }
        }

        if let Some(container) = document.select(&CONTENT_DIV).next() {
            let body = paragraph_text(container, DETAIL_SKIP_TAGS);
            if !body.is_empty() {
                item.content = Some(body);
            }
        }
    }
}
