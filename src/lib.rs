//! # News Harvest
//!
//! A keyword-driven news crawler that searches Chinese news portals,
//! extracts article text and images into per-article bundles, and
//! dispatches downstream analysis stages in dependency order.
//!
//! ## Features
//!
//! - Searches multiple news sources (新华网 and 中国新闻网) for a keyword
//!   list, paging each source until it runs dry or a result cap is hit
//! - Enriches every hit from its detail page (headline, publication date,
//!   body text) and writes one JSON artifact per (keyword, source) task
//! - Persists each artifact record as an on-disk bundle: labeled
//!   `content.txt` plus the article's in-body images
//! - Orders the external analysis stages from a JSON requirement set and
//!   runs them fail-fast, visualization always last
//!
//! ## Usage
//!
//! ```sh
//! news_harvest crawl -k 无人机袭击 --news-dir ./news --articles-dir ./articles
//! news_harvest persist --filter 新华网
//! news_harvest dispatch '{"地理定位": true, "可视化": true}'
//! ```
//!
//! ## Architecture
//!
//! The crawl subcommand is a pipeline:
//! 1. **Search**: Page each source's search endpoint per keyword ([`search`])
//! 2. **Fan-out**: Drive the (keyword × source) tasks on a bounded worker
//!    pool and merge the deduplicated aggregate ([`orchestrator`])
//! 3. **Persist**: Re-read the JSON artifacts and save one directory per
//!    article, text and images included ([`persist`])
//!
//! The dispatch subcommand stands alone: it turns a requirement set into an
//! execution order and runs the configured stage executables ([`scheduler`]).

pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod persist;
pub mod scheduler;
pub mod search;
pub mod sources;
pub mod utils;
