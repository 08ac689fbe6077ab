//! Article persistence: fetch, extract, and save one directory per article.
//!
//! [`persist_record`] turns one [`ArticleRecord`] into an on-disk
//! [`ArticleBundle`]:
//!
//! ```text
//! {articles_dir}/{sanitized_title}_{YYYYMMDD_HHMMSS}/
//! ├── content.txt        标题 / 原始文本 / 提取的中文文本 sections
//! └── images/            one file per downloadable in-body image
//! ```
//!
//! [`persist_pass`] re-walks the crawl artifacts (`*.json` in the news
//! directory, optionally filtered by a name substring) and persists every
//! record they hold, reporting saved and skipped counts. The pass is
//! tolerant end to end: an unreadable artifact, an unfetchable page, or a
//! failed image download is logged and skipped, never fatal.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::PersistError;
use crate::extract::extract;
use crate::fetch::{FetchClient, FetchPage, RetryFetch};
use crate::models::{ArticleBundle, ArticleRecord, UNTITLED};
use crate::utils::{ensure_writable_dir, sanitize_title, sniff_image_ext};

/// Outcome counts for one persistence pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub saved: usize,
    pub skipped: usize,
}

/// List the crawl artifacts under `news_dir`, name-sorted.
///
/// Only regular `*.json` files count; `filter` keeps the ones whose file
/// name contains the given substring.
pub async fn collect_artifacts(
    news_dir: &Path,
    filter: Option<&str>,
) -> Result<Vec<PathBuf>, PersistError> {
    let mut entries = tokio::fs::read_dir(news_dir)
        .await
        .map_err(|e| PersistError::io(news_dir, e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PersistError::io(news_dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| PersistError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".json") {
            continue;
        }
        if let Some(filter) = filter {
            if !name.contains(filter) {
                continue;
            }
        }
        paths.push(path);
    }

    paths.sort();
    Ok(paths)
}

/// Read one artifact's records. A single top-level object is accepted as a
/// one-element array.
pub async fn read_records(path: &Path) -> Result<Vec<ArticleRecord>, PersistError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PersistError::io(path, e))?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| PersistError::MalformedArtifact {
        path: path.to_path_buf(),
        source: e,
    })?;

    match value {
        Value::Object(_) => {
            let record = serde_json::from_value(value).map_err(|e| {
                PersistError::MalformedArtifact {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
            Ok(vec![record])
        }
        other => serde_json::from_value(other).map_err(|e| PersistError::MalformedArtifact {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Fetch one record's article page and save its bundle under
/// `articles_dir` (which must already exist).
///
/// `None` means the record was skipped: no usable link, an unfetchable
/// page, or a filesystem failure, each already logged.
#[instrument(level = "info", skip_all, fields(title = %record.title_or_placeholder()))]
pub async fn persist_record(
    client: &RetryFetch<FetchClient>,
    record: &ArticleRecord,
    articles_dir: &Path,
) -> Option<ArticleBundle> {
    let Some(link) = record.usable_link() else {
        warn!("Record has no usable link; skipping");
        return None;
    };

    let page = match client.fetch(Method::GET, link, None, &[]).await {
        Ok(page) => page,
        Err(e) => {
            warn!(url = link, error = %e, "Article page fetch failed; skipping");
            return None;
        }
    };

    let extracted = extract(&page.body, link);

    let title = record.title_or_placeholder();
    let clean = sanitize_title(title);
    let base_name = if clean.is_empty() {
        UNTITLED.to_string()
    } else {
        clean
    };
    let dir_name = format!("{base_name}_{}", Local::now().format("%Y%m%d_%H%M%S"));

    let article_dir = match create_unique_dir(articles_dir, &dir_name).await {
        Ok(dir) => dir,
        Err(e) => {
            error!(dir = dir_name, error = %e, "Could not create article directory; skipping");
            return None;
        }
    };

    let text_file = article_dir.join("content.txt");
    let body = format!(
        "标题: {title}\n\n原始文本:\n{}\n\n提取的中文文本:\n{}",
        extracted.raw_text, extracted.filtered_text
    );
    if let Err(e) = tokio::fs::write(&text_file, body).await {
        error!(path = %text_file.display(), error = %e, "Could not write article text; skipping");
        return None;
    }

    let image_files = download_images(client, &extracted.image_urls, link, &article_dir).await;

    info!(
        dir = %article_dir.display(),
        images = image_files.len(),
        "Article saved"
    );
    Some(ArticleBundle {
        article_dir,
        text_file,
        image_files,
    })
}

/// Download the article's images into `images/`, one failure at a time.
/// Image fetches are single-attempt; a missing picture is not worth a
/// retry budget.
async fn download_images(
    client: &RetryFetch<FetchClient>,
    urls: &[String],
    article_url: &str,
    article_dir: &Path,
) -> Vec<PathBuf> {
    let mut image_files = Vec::new();
    if urls.is_empty() {
        return image_files;
    }

    let images_dir = article_dir.join("images");
    if let Err(e) = tokio::fs::create_dir_all(&images_dir).await {
        warn!(path = %images_dir.display(), error = %e, "Could not create images directory");
        return image_files;
    }

    for url in urls {
        match client.inner().fetch_bytes(url, Some(article_url)).await {
            Ok(bytes) => {
                let path = images_dir.join(image_file_name(url, &bytes));
                match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => image_files.push(path),
                    Err(e) => warn!(path = %path.display(), error = %e, "Could not write image"),
                }
            }
            Err(e) => warn!(url = %url, error = %e, "Image download failed"),
        }
    }
    image_files
}

/// Create `parent/base`, appending `_2`, `_3`, … until a fresh name is
/// found. Returns the directory actually created.
async fn create_unique_dir(parent: &Path, base: &str) -> Result<PathBuf, std::io::Error> {
    let first = parent.join(base);
    match tokio::fs::create_dir(&first).await {
        Ok(()) => return Ok(first),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }

    let mut n = 2u32;
    loop {
        let candidate = parent.join(format!("{base}_{n}"));
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// File name for a downloaded image: the URL path basename when it carries
/// an extension, else a timestamp with the sniffed extension, else the
/// `image.jpg` catch-all.
fn image_file_name(url: &str, bytes: &[u8]) -> String {
    let basename = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();
    if basename.contains('.') {
        return basename;
    }
    match sniff_image_ext(bytes) {
        Some(ext) => format!("{}.{ext}", Local::now().format("%Y%m%d%H%M%S")),
        None => "image.jpg".to_string(),
    }
}

/// Persist every record of the listed artifacts. `articles_dir` must
/// already exist. Unreadable artifacts are logged and skipped.
pub async fn persist_files(
    client: &RetryFetch<FetchClient>,
    artifacts: &[PathBuf],
    articles_dir: &Path,
) -> PersistSummary {
    let mut summary = PersistSummary::default();
    for artifact in artifacts {
        let records = match read_records(artifact).await {
            Ok(records) => records,
            Err(e) => {
                error!(path = %artifact.display(), error = %e, "Unreadable artifact; skipping");
                continue;
            }
        };
        debug!(path = %artifact.display(), records = records.len(), "Processing artifact");

        for record in &records {
            match persist_record(client, record, articles_dir).await {
                Some(bundle) => {
                    summary.saved += 1;
                    debug!(dir = %bundle.article_dir.display(), "Record persisted");
                }
                None => summary.skipped += 1,
            }
        }
    }
    summary
}

/// Persist every record of every artifact under `news_dir`.
#[instrument(level = "info", skip_all, fields(news_dir = %news_dir.display(), articles_dir = %articles_dir.display()))]
pub async fn persist_pass(
    client: &RetryFetch<FetchClient>,
    news_dir: &Path,
    articles_dir: &Path,
    filter: Option<&str>,
) -> Result<PersistSummary, PersistError> {
    ensure_writable_dir(articles_dir).await?;

    let artifacts = collect_artifacts(news_dir, filter).await?;
    info!(artifacts = artifacts.len(), "Starting article persistence pass");

    let summary = persist_files(client, &artifacts, articles_dir).await;

    info!(
        saved = summary.saved,
        skipped = summary.skipped,
        "Persistence pass complete"
    );
    Ok(summary)
}
