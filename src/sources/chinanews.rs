//! 中国新闻网 (ChinaNews) descriptor.
//!
//! Search is served as HTML by `sou.chinanews.com.cn` with an offset-based
//! pager (`start` counts hits, ten per page). Hits live under
//! `ul.news-list li`. Detail pages put the headline in `h1`, the date in
//! the `div.left-t` info line ahead of the `来源` marker, and the body
//! under `div.left_zw`.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::error::ParseShapeError;
use crate::extract::paragraph_text;
use crate::models::NewsItem;
use crate::sources::{NewsSource, SearchHit, SourceId};

const SEARCH_ENDPOINT: &str = "https://sou.chinanews.com.cn/search.do";
const BASE_URL: &str = "https://www.chinanews.com.cn/";

const HEADER_OVERRIDES: &[(&str, &str)] = &[("referer", "https://sou.chinanews.com.cn/")];

const DETAIL_SKIP_TAGS: &[&str] = &["script", "style", "iframe", "img", "video"];

/// Hits per results page, mirrored in the `ps` query parameter.
const PAGE_SIZE: u32 = 10;

static HIT_LIST: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.news-list").expect("ul.news-list selector"));
static HIT_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("li selector"));
static HIT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("a[href] selector"));
static HIT_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.news-date").expect("span.news-date selector"));
static TITLE_H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static INFO_LINE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.left-t").expect("div.left-t selector"));
static BODY_DIV: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.left_zw").expect("div.left_zw selector"));

pub struct ChinaNews;

impl NewsSource for ChinaNews {
    fn id(&self) -> SourceId {
        SourceId::ChinaNews
    }

    fn label(&self) -> &str {
        "中国新闻网"
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn header_overrides(&self) -> &'static [(&'static str, &'static str)] {
        HEADER_OVERRIDES
    }

    fn search_url(&self, keyword: &str, page: u32) -> String {
        let start = page.saturating_sub(1) * PAGE_SIZE;
        format!(
            "{SEARCH_ENDPOINT}?q={}&ps={PAGE_SIZE}&start={start}",
            urlencoding::encode(keyword)
        )
    }

    fn parse_search_page(&self, body: &str) -> Result<Vec<SearchHit>, ParseShapeError> {
        let document = Html::parse_document(body);
        // The list element is what marks a recognized results page. A page
        // carrying it with zero rows is a valid "no more hits" answer.
        let list = document.select(&HIT_LIST).next().ok_or(ParseShapeError)?;

        Ok(list
            .select(&HIT_ROW)
            .filter_map(|row| {
                let anchor = row.select(&HIT_LINK).next()?;
                let url = anchor.value().attr("href")?.trim();
                if url.is_empty() {
                    return None;
                }
                let title = anchor.text().collect::<String>();
                let title = title.trim();
                Some(SearchHit {
                    url: url.to_string(),
                    title: (!title.is_empty()).then(|| title.to_string()),
                    published: row.select(&HIT_DATE).next().map(|span| {
                        span.text().collect::<String>().trim().to_string()
                    }),
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

        if let Some(info) = document.select(&INFO_LINE).next() {
            let text = info.text().collect::<String>();
            let date_part = text.split("来源").next().unwrap_or("").trim();
            if !date_part.is_empty() {
                item.published = date_part.to_string();
            }
        }

        if let Some(container) = document.select(&BODY_DIV).next() {
            let body = paragraph_text(container, DETAIL_SKIP_TAGS);
            if !body.is_empty() {
                item.content = Some(body);
            }
        }
    }
}
