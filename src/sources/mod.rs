//! Source descriptors for the news sites the crawler understands.
//!
//! Every site is one [`SourceId`] variant backed by a [`NewsSource`]
//! descriptor: label, header overrides, search endpoint template, the
//! result-shape parser for its search pages, and detail-page enrichment.
//! The paginator and orchestrator never branch on a source; they drive
//! whatever descriptor the enum hands them, so adding a site touches this
//! module only.
//!
//! | Source | Module | Search endpoint |
//! |--------|--------|-----------------|
//! | 新华网 (Xinhua) | [`xinhua`] | `https://so.news.cn/getNews` (JSON) |
//! | 中国新闻网 (ChinaNews) | [`chinanews`] | `https://sou.chinanews.com.cn/search.do` (HTML) |

pub mod chinanews;
pub mod xinhua;

use clap::ValueEnum;
use url::Url;

use crate::error::ParseShapeError;
use crate::models::NewsItem;

/// The closed set of crawlable sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SourceId {
    /// 新华网, JSON search API.
    Xinhua,
    /// 中国新闻网, HTML search results.
    ChinaNews,
}

impl SourceId {
    /// Every known source, in the order crawl tasks are generated.
    pub const ALL: [SourceId; 2] = [SourceId::Xinhua, SourceId::ChinaNews];

    /// The descriptor implementing this source's behavior.
    pub fn descriptor(self) -> &'static dyn NewsSource {
        match self {
            SourceId::Xinhua => &xinhua::Xinhua,
            SourceId::ChinaNews => &chinanews::ChinaNews,
        }
    }

    /// Human-readable site label, as written into artifacts.
    pub fn label(self) -> &'static str {
        self.descriptor().label()
    }
}

/// One raw hit from a search results page, before detail enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Link as the search page printed it; may be relative.
    pub url: String,
    pub title: Option<String>,
    pub published: Option<String>,
}

/// Behavior of one news source.
pub trait NewsSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Site label used in artifacts and logs (e.g. `新华网`).
    fn label(&self) -> &str;

    /// Base URL that relative hit links resolve against.
    fn base_url(&self) -> &str;

    /// Headers merged into every request against this source, after the
    /// defaults and before the per-attempt user-agent.
    fn header_overrides(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Absolute URL of one search results page (pages start at 1).
    fn search_url(&self, keyword: &str, page: u32) -> String;

    /// Parse a search results body into hits.
    ///
    /// `Err(ParseShapeError)` means the body does not match this source's
    /// known result shape at all. A recognized shape with zero hits is
    /// `Ok(vec![])`; the paginator treats the two very differently.
    fn parse_search_page(&self, body: &str) -> Result<Vec<SearchHit>, ParseShapeError>;

    /// Resolve a hit link to an absolute http(s) URL.
    fn resolve_url(&self, raw: &str) -> Option<String> {
        let base = Url::parse(self.base_url()).ok()?;
        let resolved = base.join(raw).ok()?;
        let scheme_ok = resolved.scheme() == "http" || resolved.scheme() == "https";
        if scheme_ok && resolved.host_str().is_some() {
            Some(resolved.to_string())
        } else {
            None
        }
    }

    /// Opportunistically override title, published date, and body text from
    /// the hit's detail page. Fields stay untouched when the page lacks the
    /// corresponding region.
    fn enrich_from_detail(&self, item: &mut NewsItem, detail_html: &str);
}
