//! Binary entry point. The pipeline itself lives in the library crate;
//! this file wires tracing, CLI parsing, and config resolution around it.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use itertools::Itertools;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

use news_harvest::cli::{Cli, Command};
use news_harvest::config::{AppConfig, StagePaths};
use news_harvest::fetch::{http_client, RetryPolicy};
use news_harvest::orchestrator::{self, CrawlOptions};
use news_harvest::persist;
use news_harvest::scheduler::{self, RequirementSet};
use news_harvest::search::SearchLimits;
use news_harvest::sources::{NewsSource, SourceId};
use news_harvest::utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_harvest starting up");

    let args = Cli::parse();
    debug!(?args.command, "Parsed CLI arguments");

    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Crawl {
            keywords,
            max_results,
            workers,
            sources,
            news_dir,
            articles_dir,
            skip_articles,
        } => {
            let news_dir = news_dir.unwrap_or_else(|| config.news_dir.clone());
            let articles_dir = articles_dir.unwrap_or_else(|| config.articles_dir.clone());
            let source_ids = if sources.is_empty() {
                SourceId::ALL.to_vec()
            } else {
                sources
            };
            let options = CrawlOptions {
                workers,
                limits: SearchLimits {
                    max_results,
                    ..SearchLimits::default()
                },
            };
            run_crawl(
                &keywords,
                &source_ids,
                &news_dir,
                &articles_dir,
                skip_articles,
                &options,
            )
            .await?;
        }
        Command::Persist {
            news_dir,
            articles_dir,
            filter,
        } => {
            let news_dir = news_dir.unwrap_or_else(|| config.news_dir.clone());
            let articles_dir = articles_dir.unwrap_or_else(|| config.articles_dir.clone());
            run_persist(&news_dir, &articles_dir, filter.as_deref()).await?;
        }
        Command::Dispatch { requirements } => {
            run_dispatch(requirements.as_deref(), &config.stages).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Crawl every keyword against the chosen sources, then (unless told
/// otherwise) run the article pass over this run's artifacts.
async fn run_crawl(
    keywords: &[String],
    source_ids: &[SourceId],
    news_dir: &Path,
    articles_dir: &Path,
    skip_articles: bool,
    options: &CrawlOptions,
) -> Result<(), Box<dyn Error>> {
    // Early check: both output directories must be writable before any
    // network traffic goes out.
    if let Err(e) = ensure_writable_dir(news_dir).await {
        error!(
            path = %news_dir.display(),
            error = %e,
            "News directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }
    if !skip_articles {
        if let Err(e) = ensure_writable_dir(articles_dir).await {
            error!(
                path = %articles_dir.display(),
                error = %e,
                "Articles directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    let client = Arc::new(http_client(RetryPolicy::default())?);
    let sources: Vec<&dyn NewsSource> = source_ids.iter().map(|id| id.descriptor()).collect();

    let items =
        orchestrator::run(Arc::clone(&client), keywords, &sources, news_dir, options).await?;
    info!(items = items.len(), "Crawl finished");

    if skip_articles {
        info!("Skipping the article pass (--skip-articles)");
        return Ok(());
    }

    // The article pass re-reads this run's artifacts from disk, so a later
    // `persist` invocation sees exactly what this pass saw.
    let artifacts: Vec<PathBuf> = keywords
        .iter()
        .flat_map(|keyword| {
            source_ids
                .iter()
                .map(move |id| orchestrator::artifact_path(news_dir, keyword, id.label()))
        })
        .filter(|path| path.is_file())
        .collect();
    info!(artifacts = artifacts.len(), "Starting the article pass");

    let summary = persist::persist_files(client.as_ref(), &artifacts, articles_dir).await;
    info!(
        saved = summary.saved,
        skipped = summary.skipped,
        "Article pass complete"
    );
    Ok(())
}

/// Re-run article persistence over whatever artifacts the news directory
/// already holds.
async fn run_persist(
    news_dir: &Path,
    articles_dir: &Path,
    filter: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let client = http_client(RetryPolicy::default())?;
    persist::persist_pass(&client, news_dir, articles_dir, filter).await?;
    Ok(())
}

/// Parse the requirement set, compute the stage order, and run it.
async fn run_dispatch(
    requirements: Option<&str>,
    paths: &StagePaths,
) -> Result<(), Box<dyn Error>> {
    let set = requirements
        .map(RequirementSet::from_json)
        .unwrap_or_default();

    let plan = scheduler::compute_order(&set);
    if plan.is_empty() {
        info!("No stages requested; nothing to do");
        return Ok(());
    }
    info!(order = %plan.iter().join(", "), "Execution order computed");

    if let Err(e) = scheduler::validate(&plan, paths) {
        error!(error = %e, "Stage validation failed");
        return Err(e.into());
    }
    if let Err(e) = scheduler::execute(&plan, paths).await {
        error!(error = %e, "Stage execution failed");
        return Err(e.into());
    }

    info!(stages = plan.len(), "All stages completed");
    Ok(())
}
