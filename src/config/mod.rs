//! Crawl configuration
//!
//! [`CrawlOptions`] carries everything one invocation needs: the root URL,
//! crawl limits, rate/retry settings, the HTTP client, and the clock. The
//! derived knobs (rate interval, effective worker count, fetch-semaphore
//! size, link-pool size) live here so the engine never re-derives them.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// Configuration for a single crawl invocation.
#[derive(Clone)]
pub struct CrawlOptions {
    /// Root URL to crawl (http or https).
    pub url: String,

    /// Maximum crawl depth; the root is depth 0.
    pub depth: usize,

    /// Number of retries after the first attempt.
    pub retries: u32,

    /// Minimum delay between requests; also the retry backoff base when
    /// positive. Ignored for rate limiting when `rps` is set.
    pub delay: Duration,

    /// Per-request timeout; zero disables it.
    pub timeout: Duration,

    /// Requests per second; overrides `delay` for rate limiting.
    pub rps: f64,

    /// User-Agent header value; empty sends no header.
    pub user_agent: String,

    /// Number of page workers; values below 1 are treated as 1.
    pub workers: usize,

    /// Cap on concurrent HTTP fetches; 0 means "same as workers".
    pub max_concurrent_fetch: usize,

    /// Two-space-indented JSON output instead of compact.
    pub indent_json: bool,

    /// HTTP client used for every request.
    pub http_client: reqwest::Client,

    /// Time source; swap in a double for deterministic tests.
    pub clock: Arc<dyn Clock>,
}

impl CrawlOptions {
    /// Creates options with defaults for everything but the URL and client.
    pub fn new(url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            retries: 0,
            delay: Duration::ZERO,
            timeout: Duration::ZERO,
            rps: 0.0,
            user_agent: String::new(),
            workers: 1,
            max_concurrent_fetch: 0,
            indent_json: false,
            http_client,
            clock: Arc::new(SystemClock),
        }
    }

    /// Minimum interval between request starts, or `None` for no limiter.
    ///
    /// `rps` wins over `delay`; a positive rps maps to `1s / rps`, clamped
    /// to at least one nanosecond.
    pub fn rate_interval(&self) -> Option<Duration> {
        if self.rps > 0.0 {
            let interval = Duration::from_secs_f64((1.0 / self.rps).min(u32::MAX as f64));

            return Some(interval.max(Duration::from_nanos(1)));
        }

        if self.delay > Duration::ZERO {
            return Some(self.delay);
        }

        None
    }

    /// Effective page-worker count, at least 1.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Size of the fetch semaphore: the override when set, else the worker
    /// count, at least 1.
    pub fn fetch_concurrency(&self) -> usize {
        if self.max_concurrent_fetch > 0 {
            return self.max_concurrent_fetch;
        }

        self.worker_count()
    }

    /// Size of the link-check pool: two workers, but never more than the
    /// fetch concurrency.
    pub fn link_check_pool_size(&self) -> usize {
        self.fetch_concurrency().min(2).max(1)
    }

    /// Capacity of the crawl-job queue.
    pub fn job_queue_capacity(&self) -> usize {
        (self.worker_count() * 4).max(16)
    }
}

/// Parses a human-friendly duration for the CLI.
///
/// Accepts `ns`, `us`, `ms`, `s`, `m`, `h` suffixes (e.g. `300ms`, `2s`,
/// `1m`) or a bare number of seconds (`1.5`).
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }

    let (number, unit) = match trimmed.find(|c: char| c.is_ascii_alphabetic()) {
        Some(split) => trimmed.split_at(split),
        None => (trimmed, "s"),
    };

    let amount: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration {trimmed:?}"))?;

    if amount < 0.0 || !amount.is_finite() {
        return Err(format!("invalid duration {trimmed:?}"));
    }

    let seconds = match unit {
        "ns" => amount / 1e9,
        "us" => amount / 1e6,
        "ms" => amount / 1e3,
        "s" => amount,
        "m" => amount * 60.0,
        "h" => amount * 3600.0,
        _ => return Err(format!("unknown duration unit {unit:?}")),
    };

    Ok(Duration::from_secs_f64(seconds))
}
