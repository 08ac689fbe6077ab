//! HTTP fetching with rotating identity headers and bounded retries.
//!
//! This module is the only place the crate touches the network. It layers
//! a retry decorator over a plain page fetcher so every caller gets the
//! same budget and backoff behavior.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`FetchPage`]: Core trait defining a single-attempt page fetch
//! - [`FetchClient`]: Implements it over a shared `reqwest` client
//! - [`RetryFetch`]: Decorator that adds retry logic to any [`FetchPage`]
//!
//! # Retry Strategy
//!
//! - Maximum 3 attempts per URL
//! - Linear backoff: `base_delay * attempt_number` (2 s, then 4 s)
//! - User-agent re-randomized on every attempt, so a repeat attempt never
//!   presents the fingerprint that just got blocked
//! - Non-retryable causes (unparseable URLs) fail immediately
//!
//! Verification challenge pages (HTTP 200 whose body is an anti-automation
//! interstitial) are reported as soft failures and retried exactly like
//! transport errors; they are never handed to callers as content.

use std::fmt;
use std::time::{Duration, Instant};

use rand::prelude::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::error::FetchError;
use crate::sources::SourceId;

/// Transport-level timeout applied to every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Desktop browser identities rotated across attempts.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.2903.86",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
];

/// Body markers that reveal an anti-automation interstitial.
const CHALLENGE_MARKER_ZH: &str = "验证";
const CHALLENGE_MARKER_EN: &str = "verification";

/// Pick a fresh browser identity.
fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// One fetched page: status line, response headers, and decoded body text.
#[derive(Debug)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Trait for a single-attempt page fetch.
///
/// Implementors take a method, URL, optional source hint (selecting that
/// source's header overrides), and extra headers, and produce a decoded
/// page or a [`FetchError`]. Decorators such as [`RetryFetch`] wrap any
/// implementation.
pub trait FetchPage {
    /// Fetch one page. A successful return means real content: challenge
    /// interstitials and error statuses come back as `Err`.
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        source: Option<SourceId>,
        extra_headers: &[(&str, &str)],
    ) -> Result<FetchedPage, FetchError>;
}

/// Validate that `url` is absolute with an http(s) scheme and a host.
fn parse_absolute(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let scheme_ok = parsed.scheme() == "http" || parsed.scheme() == "https";
    if !scheme_ok || parsed.host_str().is_none() {
        return Err(FetchError::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}

/// Plain HTTP page fetcher over one shared connection pool.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: reqwest::Client,
}

impl FetchClient {
    /// Build the shared client with the fixed per-call timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Assemble request headers: defaults, then the source's overrides, then
    /// per-call extras, then a freshly randomized user-agent (always last,
    /// so rotation wins over any fixed identity in the override set).
    fn headers_for(source: Option<SourceId>, extra_headers: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));

        let overrides = source
            .map(|id| id.descriptor().header_overrides())
            .unwrap_or(&[]);
        for (name, value) in overrides.iter().chain(extra_headers.iter()) {
            match (HeaderName::try_from(*name), HeaderValue::from_str(value)) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => warn!(name, "Skipping malformed header override"),
            }
        }

        if let Ok(ua) = HeaderValue::from_str(random_user_agent()) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Download a binary body (images), with the same URL validation and
    /// status handling as page fetches but no challenge scan.
    ///
    /// Sends `referer` when given; some CDNs refuse image requests that
    /// arrive without the owning article as referer.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        let parsed = parse_absolute(url)?;
        let mut headers = Self::headers_for(None, &[]);
        if let Some(referer) = referer {
            if let Ok(v) = HeaderValue::from_str(referer) {
                headers.insert(REFERER, v);
            }
        }

        let response = self
            .http
            .get(parsed)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

impl FetchPage for FetchClient {
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        source: Option<SourceId>,
        extra_headers: &[(&str, &str)],
    ) -> Result<FetchedPage, FetchError> {
        let parsed = parse_absolute(url)?;
        let headers = Self::headers_for(source, extra_headers);

        let t0 = Instant::now();
        let response = self
            .http
            .request(method, parsed)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let response_headers = response.headers().clone();
        let body = response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        // Some front doors answer 200 with a human-verification interstitial
        // instead of content. Treat that as a failed attempt, not a page.
        if body.contains(CHALLENGE_MARKER_ZH)
            || body.to_lowercase().contains(CHALLENGE_MARKER_EN)
        {
            warn!(
                url,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Response body looks like a verification challenge"
            );
            return Err(FetchError::VerificationChallenge {
                url: url.to_string(),
            });
        }

        Ok(FetchedPage {
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Retry policy: attempt budget and the base of the linear backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before giving up (first attempt included).
    pub max_attempts: u32,
    /// Backoff base; the sleep after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Wrapper that adds bounded linear-backoff retry to any [`FetchPage`].
///
/// Identity rotation lives in the inner fetcher, so every retried attempt
/// automatically presents a fresh user-agent. The final failed attempt is
/// reported as [`FetchError::Exhausted`] carrying the last real cause.
pub struct RetryFetch<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryFetch<T>
where
    T: FetchPage,
{
    /// Wrap `inner` with the given retry policy.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Access the undecorated fetcher (single-attempt paths, e.g. image
    /// downloads).
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T> FetchPage for RetryFetch<T>
where
    T: FetchPage + fmt::Debug,
{
    #[instrument(level = "info", skip_all, fields(url = %url))]
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        source: Option<SourceId>,
        extra_headers: &[(&str, &str)],
    ) -> Result<FetchedPage, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self
                .inner
                .fetch(method.clone(), url, source, extra_headers)
                .await
            {
                Ok(page) => {
                    if attempt > 1 {
                        info!(
                            url,
                            attempt,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            "Fetch recovered after retry"
                        );
                    }
                    return Ok(page);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= self.policy.max_attempts {
                        error!(
                            url,
                            attempt,
                            max = self.policy.max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "Fetch exhausted its retry budget"
                        );
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }

                    let delay = self.policy.base_delay.saturating_mul(attempt);
                    warn!(
                        url,
                        attempt,
                        max = self.policy.max_attempts,
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Build the standard retrying HTTP client used by the crawl and persist
/// pipelines.
pub fn http_client(policy: RetryPolicy) -> Result<RetryFetch<FetchClient>, reqwest::Error> {
    Ok(RetryFetch::new(FetchClient::new()?, policy))
}
