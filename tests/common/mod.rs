//! Shared helpers for the end-to-end crawl tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use siteprobe::clock::{Canceled, Clock};
use siteprobe::config::CrawlOptions;

/// Fixed timestamp used across tests so report times are deterministic.
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 34, 56).unwrap()
}

/// Deterministic clock: time only moves when a sleep "happens", and every
/// sleep is recorded instead of actually waiting.
pub struct MockClock {
    state: Mutex<MockClockState>,
}

struct MockClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockClockState {
                now: fixture_time(),
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    async fn sleep(&self, cancel: &CancellationToken, duration: Duration) -> Result<(), Canceled> {
        if cancel.is_cancelled() {
            return Err(Canceled);
        }

        let mut state = self.state.lock();
        state.sleeps.push(duration);
        state.now += chrono::Duration::from_std(duration).unwrap_or_default();

        Ok(())
    }
}

/// Options against a test server, with a mock clock and a single worker.
pub fn test_options(url: &str, clock: Arc<MockClock>) -> CrawlOptions {
    let mut opts = CrawlOptions::new(url, reqwest::Client::new());
    opts.depth = 1;
    opts.timeout = Duration::from_secs(5);
    opts.user_agent = "siteprobe-test".to_string();
    opts.workers = 1;
    opts.clock = clock;

    opts
}
