//! Crawl scheduler and result aggregator
//!
//! All scheduling state lives on one logical task: the `seen` set, the
//! pending-job counter, the sequence counters, and the buffer of pages
//! waiting for in-order commit. Workers only ever talk to it through the
//! bounded job and result channels, which keeps the BFS deterministic even
//! though pages finish out of order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kanal::{AsyncReceiver, AsyncSender};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::engine::{CrawlJob, PageResult};
use crate::clock::Clock;
use crate::report::{Page, Report};
use crate::url::same_origin;
use crate::CrawlError;

/// Single-owner BFS state: enqueue/dedup, pending accounting, and ordered
/// page commit.
pub(crate) struct Aggregator {
    clock: Arc<dyn Clock>,
    base_url: Url,
    max_depth: usize,
    jobs_tx: Option<AsyncSender<CrawlJob>>,
    seen: HashSet<String>,
    pending: usize,
    next_seq: u64,
    next_commit: u64,
    pending_pages: HashMap<u64, Page>,
    analysis_error: Option<CrawlError>,
}

impl Aggregator {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        base_url: Url,
        max_depth: usize,
        jobs_tx: AsyncSender<CrawlJob>,
    ) -> Self {
        Self {
            clock,
            base_url,
            max_depth,
            jobs_tx: Some(jobs_tx),
            seen: HashSet::new(),
            pending: 0,
            next_seq: 0,
            next_commit: 0,
            pending_pages: HashMap::new(),
            analysis_error: None,
        }
    }

    /// Enqueues a URL at `depth`, assigning the next sequence number.
    ///
    /// Duplicates and anything after cancellation or queue close are
    /// dropped. The send can block when the queue is full; that is safe
    /// because the caller is the same task that drains results, so workers
    /// keep making space.
    pub(crate) async fn enqueue(&mut self, cancel: &CancellationToken, url: String, depth: usize) {
        if self.seen.contains(&url) || cancel.is_cancelled() {
            return;
        }

        let Some(jobs_tx) = &self.jobs_tx else {
            return;
        };

        let job = CrawlJob {
            url: url.clone(),
            depth,
            discovered_at: self.clock.now(),
            seq: self.next_seq,
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => false,
            result = jobs_tx.send(job) => result.is_ok(),
        };

        if sent {
            self.seen.insert(url);
            self.next_seq += 1;
            self.pending += 1;
        }
    }

    /// Closes the job queue once no work is outstanding.
    pub(crate) fn close_jobs_if_idle(&mut self) {
        if self.pending != 0 {
            return;
        }

        self.close_jobs();
    }

    /// Closes the job queue unconditionally (cancellation path).
    pub(crate) fn close_jobs(&mut self) {
        if let Some(jobs_tx) = self.jobs_tx.take() {
            jobs_tx.close();
        }
    }

    /// Handles one worker result: commit pages in sequence order, latch a
    /// root error, and enqueue newly discovered same-origin links.
    pub(crate) async fn on_result(
        &mut self,
        cancel: &CancellationToken,
        report: &mut Report,
        result: PageResult,
    ) {
        self.pending -= 1;
        self.handle_result(cancel, report, result).await;
        self.close_jobs_if_idle();
    }

    async fn handle_result(
        &mut self,
        cancel: &CancellationToken,
        report: &mut Report,
        result: PageResult,
    ) {
        self.pending_pages.insert(result.job.seq, result.page);
        self.flush_committed(report);

        if result.job.depth == 0 {
            if let Some(error) = result.error {
                if self.analysis_error.is_none() {
                    tracing::warn!(url = %result.job.url, error = %error, "root page failed");
                    self.analysis_error = Some(error);
                }
            }
        }

        let next_depth = result.job.depth + 1;
        if next_depth > self.max_depth {
            return;
        }

        for link in result.links {
            if !same_origin(&self.base_url, &link) {
                continue;
            }

            self.enqueue(cancel, link, next_depth).await;
        }
    }

    /// Moves every consecutively numbered page into the report.
    fn flush_committed(&mut self, report: &mut Report) {
        while let Some(page) = self.pending_pages.remove(&self.next_commit) {
            report.pages.push(page);
            self.next_commit += 1;
        }
    }

    pub(crate) fn take_error(&mut self) -> Option<CrawlError> {
        self.analysis_error.take()
    }
}

/// Drains worker results until the result channel closes.
///
/// On cancellation the aggregator stops accepting new work and closes the
/// job queue, but keeps draining so the partial report stays coherent.
pub(crate) async fn drain_results(
    aggregator: &mut Aggregator,
    cancel: &CancellationToken,
    report: &mut Report,
    results_rx: AsyncReceiver<PageResult>,
) {
    let mut canceled = false;

    loop {
        if canceled {
            match results_rx.recv().await {
                Ok(result) => aggregator.on_result(cancel, report, result).await,
                Err(_) => return,
            }

            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                canceled = true;
                aggregator.close_jobs();
            }
            received = results_rx.recv() => match received {
                Ok(result) => aggregator.on_result(cancel, report, result).await,
                Err(_) => return,
            },
        }
    }
}
