//! Command-line interface definitions for the news harvest pipeline.
//!
//! Three subcommands mirror the pipeline's entry points: `crawl` runs the
//! keyword search fan-out (and, unless told otherwise, the article
//! persistence pass), `persist` re-runs persistence over existing crawl
//! artifacts, and `dispatch` orders and runs the downstream analysis
//! stages.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::sources::SourceId;

/// Keyword news crawler and analysis-stage dispatcher.
///
/// # Examples
///
/// ```sh
/// # Crawl the default keyword against every source
/// news_harvest crawl
///
/// # Two keywords, one source, JSON artifacts only
/// news_harvest crawl -k 演习,无人机袭击 --sources xinhua --skip-articles
///
/// # Run the stages a requirement set asks for
/// news_harvest dispatch '{"地理定位": true, "可视化": true}'
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the harvest.yaml config file
    #[arg(long, global = true, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the news sources and store what they return
    Crawl {
        /// Comma-separated search keywords
        #[arg(short, long, value_delimiter = ',', default_value = "无人机袭击")]
        keywords: Vec<String>,

        /// Stop each (keyword, source) search after this many items
        #[arg(long, default_value_t = 100)]
        max_results: usize,

        /// Concurrent (keyword, source) search tasks
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Sources to crawl; omit for all of them
        #[arg(long, value_delimiter = ',')]
        sources: Vec<SourceId>,

        /// Directory for the per-(keyword, source) JSON artifacts
        #[arg(long)]
        news_dir: Option<PathBuf>,

        /// Directory for the per-article bundles
        #[arg(long)]
        articles_dir: Option<PathBuf>,

        /// Stop after the JSON artifacts; skip the article pass
        #[arg(long)]
        skip_articles: bool,
    },

    /// Re-run article persistence over existing crawl artifacts
    Persist {
        /// Directory holding the crawl artifacts
        #[arg(long)]
        news_dir: Option<PathBuf>,

        /// Directory for the per-article bundles
        #[arg(long)]
        articles_dir: Option<PathBuf>,

        /// Only process artifacts whose file name contains this substring
        #[arg(long)]
        filter: Option<String>,
    },

    /// Order and run the downstream analysis stages
    Dispatch {
        /// JSON requirement object, e.g. '{"地理定位": true, "可视化": true}'
        requirements: Option<String>,
    },
}
