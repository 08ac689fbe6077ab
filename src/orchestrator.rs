//! Crawl fan-out over (keyword × source) tasks.
//!
//! [`run`] generates one search task per keyword/source pair and drives
//! them on a bounded worker pool. Each task writes its own result list
//! verbatim to `{keyword}_{source_label}.json` before anything is merged,
//! so a crash mid-run leaves the finished tasks' artifacts on disk. After
//! the pool drains, the aggregate is deduplicated by canonical URL
//! (first seen wins, in aggregate insertion order) and summarized.
//!
//! Tasks are isolated: a task that comes back empty or fails to write its
//! artifact contributes whatever items it did collect and never stops the
//! other tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{error, info, instrument};

use crate::dedup::dedup_by_canonical_link;
use crate::error::PersistError;
use crate::fetch::FetchPage;
use crate::models::NewsItem;
use crate::search::{search, SearchLimits};
use crate::sources::NewsSource;
use crate::utils::ensure_writable_dir;

/// Worker-pool sizing and per-task search limits for one crawl run.
#[derive(Debug, Clone, Copy)]
pub struct CrawlOptions {
    /// Concurrent (keyword × source) tasks.
    pub workers: usize,
    pub limits: SearchLimits,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            limits: SearchLimits::default(),
        }
    }
}

/// Artifact path for one task: `{keyword}_{source_label}.json`.
pub fn artifact_path(news_dir: &Path, keyword: &str, label: &str) -> PathBuf {
    news_dir.join(format!("{keyword}_{label}.json"))
}

/// Crawl every keyword against every source and return the deduplicated
/// aggregate.
///
/// The news directory is created and probed writable before any network
/// traffic; that failure is the only error this function surfaces.
#[instrument(level = "info", skip_all, fields(keywords = keywords.len(), sources = sources.len(), workers = options.workers))]
pub async fn run<F>(
    client: Arc<F>,
    keywords: &[String],
    sources: &[&dyn NewsSource],
    news_dir: &Path,
    options: &CrawlOptions,
) -> Result<Vec<NewsItem>, PersistError>
where
    F: FetchPage + Send + Sync,
{
    ensure_writable_dir(news_dir).await?;

    let tasks: Vec<(&str, &dyn NewsSource)> = keywords
        .iter()
        .flat_map(|keyword| sources.iter().map(move |source| (keyword.as_str(), *source)))
        .collect();
    info!(tasks = tasks.len(), "Crawl tasks generated");

    let per_task: Vec<Vec<NewsItem>> = stream::iter(tasks)
        .map(|(keyword, source)| {
            let client = Arc::clone(&client);
            async move { run_task(client.as_ref(), source, keyword, news_dir, &options.limits).await }
        })
        .buffer_unordered(options.workers.max(1))
        .collect()
        .await;

    let merged: Vec<NewsItem> = per_task.into_iter().flatten().collect();
    let collected = merged.len();
    let items = dedup_by_canonical_link(merged);

    let per_source = items.iter().counts_by(|item| item.source.clone());
    info!(
        total = items.len(),
        duplicates_removed = collected - items.len(),
        ?per_source,
        "Crawl aggregate merged"
    );
    Ok(items)
}

/// One task: search, then write the verbatim pre-dedup artifact.
async fn run_task<F>(
    client: &F,
    source: &dyn NewsSource,
    keyword: &str,
    news_dir: &Path,
    limits: &SearchLimits,
) -> Vec<NewsItem>
where
    F: FetchPage,
{
    let items = search(client, source, keyword, limits).await;

    let artifact = artifact_path(news_dir, keyword, source.label());
    match serde_json::to_string_pretty(&items) {
        Ok(json) => match tokio::fs::write(&artifact, json).await {
            Ok(()) => {
                info!(path = %artifact.display(), items = items.len(), "Wrote crawl artifact");
            }
            Err(e) => {
                // The items still reach the aggregate; only the on-disk
                // copy is lost.
                error!(path = %artifact.display(), error = %e, "Failed to write crawl artifact");
            }
        },
        Err(e) => error!(keyword, error = %e, "Failed to serialize crawl artifact"),
    }

    items
}
