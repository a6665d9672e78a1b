//! Crawl engine: page processing and cached fetching
//!
//! The [`Analyzer`] owns the shared fetch machinery: the fetcher, the
//! fetch-concurrency semaphore, and the two single-flight caches. Page
//! workers call [`Analyzer::process_job`] for each crawl job; the result
//! carries the finished page plus any same-origin crawl candidates for the
//! aggregator to consider.

use chrono::{DateTime, Utc};
use kanal::AsyncSender;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::cache::{await_value, Flight, FlightCache};
use super::links::{build_link_results, run_link_checks, LinkCheckJob, LinkProbe};
use crate::fetcher::{FetchError, FetchResponse, Fetcher};
use crate::html::{self, AssetRef, ParsedPage};
use crate::report::{format_timestamp, Asset, BrokenLink, Page, PageStatus, Seo};
use crate::url::{resolve, same_origin};
use crate::CrawlError;

/// A scheduled fetch of one page.
#[derive(Debug, Clone)]
pub(crate) struct CrawlJob {
    pub(crate) url: String,
    pub(crate) depth: usize,
    pub(crate) discovered_at: DateTime<Utc>,
    pub(crate) seq: u64,
}

/// What a worker hands back to the aggregator for one job.
pub(crate) struct PageResult {
    pub(crate) job: CrawlJob,
    pub(crate) page: Page,
    pub(crate) links: Vec<String>,
    pub(crate) error: Option<CrawlError>,
}

type FetchOutcome = Result<FetchResponse, FetchError>;

/// Derived per-asset fetch result kept in the asset cache.
#[derive(Debug, Clone)]
pub(crate) struct AssetProbe {
    status_code: u16,
    size_bytes: u64,
    error: String,
}

/// Shared crawl state: fetcher, semaphore, and the single-flight caches.
pub(crate) struct Analyzer {
    base_url: Url,
    fetcher: Fetcher,
    max_depth: usize,
    fetch_sem: Semaphore,
    fetch_cache: FlightCache<FetchOutcome>,
    asset_cache: FlightCache<AssetProbe>,
}

impl Analyzer {
    pub(crate) fn new(
        base_url: Url,
        fetcher: Fetcher,
        max_depth: usize,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            base_url,
            fetcher,
            max_depth,
            fetch_sem: Semaphore::new(fetch_concurrency.max(1)),
            fetch_cache: FlightCache::new(),
            asset_cache: FlightCache::new(),
        }
    }

    /// Fetches a URL through the single-flight cache, under the fetch
    /// semaphore.
    ///
    /// At most one underlying fetch happens per URL per invocation;
    /// followers observe the first caller's outcome. A follower's
    /// cancellation unblocks only that follower.
    pub(crate) async fn fetch_with_cache(
        &self,
        cancel: &CancellationToken,
        absolute_url: &str,
    ) -> FetchOutcome {
        let publisher = match self.fetch_cache.begin(absolute_url) {
            Flight::Follower(ready) => {
                return match await_value(ready, cancel).await {
                    Ok(outcome) => (*outcome).clone(),
                    Err(_) => Err(FetchError::Canceled),
                };
            }
            Flight::Leader(publisher) => publisher,
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => None,
            permit = self.fetch_sem.acquire() => permit.ok(),
        };

        let Some(_permit) = permit else {
            self.fetch_cache.remove(absolute_url);
            let outcome = publisher.publish(Err(FetchError::Canceled));

            return (*outcome).clone();
        };

        let outcome = self.fetcher.fetch(cancel, absolute_url).await;

        (*publisher.publish(outcome)).clone()
    }

    /// Probes one outbound link for the link-check pool.
    pub(crate) async fn probe_link(
        &self,
        cancel: &CancellationToken,
        absolute_url: &str,
    ) -> LinkProbe {
        match self.fetch_with_cache(cancel, absolute_url).await {
            Ok(_) => LinkProbe::Reachable,
            Err(FetchError::Canceled) => LinkProbe::Skipped,
            Err(err) => LinkProbe::Broken(BrokenLink {
                url: absolute_url.to_string(),
                status_code: err.status(),
                error: err.to_string(),
            }),
        }
    }

    /// Processes one crawl job into a page result.
    pub(crate) async fn process_job(
        &self,
        cancel: &CancellationToken,
        link_jobs: &AsyncSender<LinkCheckJob>,
        job: CrawlJob,
    ) -> PageResult {
        let discovered_at = format_timestamp(job.discovered_at);

        let response = match self.fetch_with_cache(cancel, &job.url).await {
            Ok(response) => response,
            Err(err) => {
                let page = error_page(&job, discovered_at, err.status(), err.to_string());

                return PageResult {
                    job,
                    page,
                    links: Vec::new(),
                    error: Some(err.into()),
                };
            }
        };

        let parsed = match html::parse_page(&response.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(url = %job.url, error = %err, "page body failed to parse");
                let page = error_page(
                    &job,
                    discovered_at,
                    response.status,
                    format!("parse html: {err}"),
                );

                return PageResult {
                    job,
                    page,
                    links: Vec::new(),
                    error: Some(err.into()),
                };
            }
        };

        let (broken_links, crawl_links) = self.check_links(cancel, link_jobs, &job, &parsed).await;
        let assets = self.collect_assets(cancel, &job.url, &parsed.assets).await;

        let page = Page {
            url: job.url.clone(),
            depth: job.depth,
            http_status: response.status,
            status: PageStatus::Ok,
            error: String::new(),
            seo: Seo {
                has_title: parsed.seo.has_title,
                title: parsed.seo.title,
                has_description: parsed.seo.has_description,
                description: parsed.seo.description,
                has_h1: parsed.seo.has_h1,
            },
            broken_links: Some(broken_links),
            assets: Some(assets),
            discovered_at,
        };

        PageResult {
            job,
            page,
            links: crawl_links,
            error: None,
        }
    }

    /// Resolves a page's links and probes the same-origin ones.
    ///
    /// Pages at the maximum depth contribute neither broken-link checks nor
    /// crawl candidates, so no probe traffic originates there.
    async fn check_links(
        &self,
        cancel: &CancellationToken,
        link_jobs: &AsyncSender<LinkCheckJob>,
        job: &CrawlJob,
        parsed: &ParsedPage,
    ) -> (Vec<BrokenLink>, Vec<String>) {
        if job.depth >= self.max_depth {
            return (Vec::new(), Vec::new());
        }

        let resolved = self.resolve_links(&job.url, &parsed.links);
        if resolved.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let results = run_link_checks(cancel, link_jobs, &resolved).await;

        build_link_results(&resolved, results)
    }

    /// Resolves raw hrefs against the page URL into absolute same-origin
    /// URLs, deduplicated by absolute form and kept in document order.
    fn resolve_links(&self, page_url: &str, links: &[String]) -> Vec<String> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };

        let mut resolved = Vec::with_capacity(links.len());
        let mut seen = std::collections::HashSet::new();

        for link in links {
            let Some(absolute_url) = resolve(&base, link) else {
                continue;
            };

            if !same_origin(&self.base_url, &absolute_url) {
                continue;
            }

            if seen.insert(absolute_url.clone()) {
                resolved.push(absolute_url);
            }
        }

        resolved
    }

    /// Resolves and fetches a page's asset references.
    ///
    /// Assets are deduplicated by absolute URL within the page; the derived
    /// result is cached invocation-wide, so every page referencing the same
    /// asset reuses one fetch, each with its own declared type.
    async fn collect_assets(
        &self,
        cancel: &CancellationToken,
        page_url: &str,
        assets: &[AssetRef],
    ) -> Vec<Asset> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };

        let mut collected = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for asset_ref in assets {
            let Some(absolute_url) = resolve(&base, &asset_ref.url) else {
                continue;
            };

            if !seen.insert(absolute_url.clone()) {
                continue;
            }

            let probe = self.get_asset(cancel, &absolute_url).await;

            collected.push(Asset {
                url: absolute_url,
                kind: asset_ref.kind,
                status_code: probe.status_code,
                size_bytes: probe.size_bytes,
                error: probe.error,
            });
        }

        collected
    }

    /// Fetches one asset through the layered caches.
    async fn get_asset(&self, cancel: &CancellationToken, absolute_url: &str) -> AssetProbe {
        let publisher = match self.asset_cache.begin(absolute_url) {
            Flight::Follower(ready) => {
                return match await_value(ready, cancel).await {
                    Ok(probe) => (*probe).clone(),
                    Err(_) => AssetProbe {
                        status_code: 0,
                        size_bytes: 0,
                        error: FetchError::Canceled.to_string(),
                    },
                };
            }
            Flight::Leader(publisher) => publisher,
        };

        let outcome = self.fetch_with_cache(cancel, absolute_url).await;
        let probe = asset_probe_from(outcome);

        (*publisher.publish(probe)).clone()
    }
}

fn error_page(job: &CrawlJob, discovered_at: String, http_status: u16, error: String) -> Page {
    Page {
        url: job.url.clone(),
        depth: job.depth,
        http_status,
        status: PageStatus::Error,
        error,
        seo: Seo::default(),
        broken_links: None,
        assets: None,
        discovered_at,
    }
}

/// Derives the recorded asset tuple from a fetch outcome.
///
/// Size comes from `Content-Length` when present (invalid values count as
/// an error and yield 0), else the body length. HTTP failures still report
/// a size when the response is available.
fn asset_probe_from(outcome: FetchOutcome) -> AssetProbe {
    match outcome {
        Ok(response) => match asset_size(&response) {
            Ok(size_bytes) => AssetProbe {
                status_code: response.status,
                size_bytes,
                error: String::new(),
            },
            Err(size_err) => AssetProbe {
                status_code: response.status,
                size_bytes: 0,
                error: size_err,
            },
        },
        Err(err) => {
            let Some(response) = err.response() else {
                return AssetProbe {
                    status_code: err.status(),
                    size_bytes: 0,
                    error: err.to_string(),
                };
            };

            let mut parts = vec![format!("http status {}", response.status)];
            parts.push(err.to_string());

            let size_bytes = match asset_size(response) {
                Ok(size) => size,
                Err(size_err) => {
                    parts.push(size_err);
                    0
                }
            };

            AssetProbe {
                status_code: response.status,
                size_bytes,
                error: parts.join(": "),
            }
        }
    }
}

fn asset_size(response: &FetchResponse) -> Result<u64, String> {
    if let Some(value) = response.headers.get(reqwest::header::CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| "invalid content length header".to_string())?;
        let trimmed = text.trim();

        return trimmed
            .parse::<u64>()
            .map_err(|_| format!("invalid content length {trimmed:?}"));
    }

    Ok(response.body.len() as u64)
}
