//! Crawl orchestration
//!
//! [`crawl_site`] is the library entry point: it validates the root URL,
//! builds the shared fetcher and rate limiter, spawns the page workers and
//! the link-check pool, runs the aggregator loop, and returns the report.
//! The report is always produced; only configuration and root-page
//! failures also surface as the invocation error.

mod cache;
mod engine;
mod links;
mod scheduler;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::CrawlOptions;
use crate::fetcher::Fetcher;
use crate::limiter::RateLimiter;
use crate::report::{format_timestamp, Page, PageStatus, Report, Seo};
use crate::url::{parse_root_url, root_display};
use crate::CrawlError;

use engine::{Analyzer, PageResult};
use links::LinkChecker;
use scheduler::{drain_results, Aggregator};

/// Result of one crawl invocation.
///
/// `error` is `Some` only for configuration problems or a root-page
/// failure; nested failures are captured inside the report instead.
pub struct CrawlOutcome {
    pub report: Report,
    pub error: Option<CrawlError>,
}

/// Crawls a site and returns the report plus the overall outcome.
pub async fn crawl_site(cancel: &CancellationToken, opts: &CrawlOptions) -> CrawlOutcome {
    let mut report = Report::new(&opts.url, opts.depth, opts.clock.now());

    if opts.url.is_empty() {
        return CrawlOutcome {
            report,
            error: Some(CrawlError::MissingUrl),
        };
    }

    let base_url = match parse_root_url(&opts.url) {
        Ok(base_url) => base_url,
        Err(err) => {
            report.pages.push(invalid_root_page(opts, &err.to_string()));

            return CrawlOutcome {
                report,
                error: Some(CrawlError::InvalidRootUrl(err.to_string())),
            };
        }
    };

    let root_url = root_display(&base_url);
    report.root_url = root_url.clone();

    tracing::info!(
        url = %root_url,
        depth = opts.depth,
        workers = opts.worker_count(),
        "starting crawl"
    );

    let limiter = opts
        .rate_interval()
        .and_then(|interval| RateLimiter::new(interval, opts.clock.clone()));

    let fetcher = Fetcher::new(
        opts.http_client.clone(),
        opts.timeout,
        opts.user_agent.clone(),
        limiter,
        opts.retries,
        opts.delay,
        opts.clock.clone(),
    );

    let analyzer = Arc::new(Analyzer::new(
        base_url.clone(),
        fetcher,
        opts.depth,
        opts.fetch_concurrency(),
    ));

    let link_checker = LinkChecker::start(
        Arc::clone(&analyzer),
        cancel.clone(),
        opts.link_check_pool_size(),
    );

    let (jobs_tx, jobs_rx) = kanal::bounded_async(opts.job_queue_capacity());
    let (results_tx, results_rx) = kanal::bounded_async::<PageResult>(opts.worker_count());

    let mut workers = Vec::with_capacity(opts.worker_count());
    for _ in 0..opts.worker_count() {
        let analyzer = Arc::clone(&analyzer);
        let cancel = cancel.clone();
        let jobs_rx = jobs_rx.clone();
        let results_tx = results_tx.clone();
        let link_jobs = link_checker.jobs();

        workers.push(tokio::spawn(async move {
            while let Ok(job) = jobs_rx.recv().await {
                let result = analyzer.process_job(&cancel, &link_jobs, job).await;
                if results_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }

    // The aggregator holds the only other sender; workers dropping theirs
    // is what closes the result channel.
    drop(results_tx);
    drop(jobs_rx);

    let mut aggregator = Aggregator::new(opts.clock.clone(), base_url, opts.depth, jobs_tx);
    aggregator.enqueue(cancel, root_url, 0).await;
    aggregator.close_jobs_if_idle();

    drain_results(&mut aggregator, cancel, &mut report, results_rx).await;

    for worker in workers {
        let _ = worker.await;
    }
    link_checker.stop().await;

    let error = aggregator.take_error();
    tracing::info!(
        pages = report.pages.len(),
        failed = error.is_some(),
        "crawl finished"
    );

    CrawlOutcome { report, error }
}

fn invalid_root_page(opts: &CrawlOptions, reason: &str) -> Page {
    Page {
        url: opts.url.clone(),
        depth: 0,
        http_status: 0,
        status: PageStatus::Error,
        error: format!("invalid url: {reason}"),
        seo: Seo::default(),
        broken_links: None,
        assets: None,
        discovered_at: format_timestamp(opts.clock.now()),
    }
}
