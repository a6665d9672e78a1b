//! Link-check pool
//!
//! A small fixed-size worker group probes outbound links through the shared
//! fetch cache. Pages submit their resolved same-origin links as jobs and
//! collect outcomes keyed by submission index, so results map back to the
//! original link order regardless of completion order.

use std::sync::Arc;

use kanal::{AsyncReceiver, AsyncSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::Analyzer;
use crate::report::BrokenLink;
use crate::url::canonical_broken_url;

/// Probe outcome for one link.
#[derive(Debug, Clone)]
pub(crate) enum LinkProbe {
    /// Response received with status < 400; a candidate for crawling.
    Reachable,
    /// Transport failure or status >= 400.
    Broken(BrokenLink),
    /// Probe interrupted by shutdown; cancellation is not a link failure.
    Skipped,
}

/// One unit of work for the pool.
pub(crate) struct LinkCheckJob {
    pub(crate) idx: usize,
    pub(crate) url: String,
    pub(crate) result_tx: AsyncSender<LinkCheckOutcome>,
}

/// A probe result tagged with its submission index.
pub(crate) struct LinkCheckOutcome {
    pub(crate) idx: usize,
    pub(crate) probe: LinkProbe,
}

/// Fixed-size worker pool reading link-check jobs from a shared channel.
pub(crate) struct LinkChecker {
    jobs_tx: AsyncSender<LinkCheckJob>,
    workers: Vec<JoinHandle<()>>,
}

impl LinkChecker {
    /// Starts `pool_size` workers probing via the analyzer's fetch cache.
    pub(crate) fn start(
        analyzer: Arc<Analyzer>,
        cancel: CancellationToken,
        pool_size: usize,
    ) -> Self {
        let (jobs_tx, jobs_rx) = kanal::bounded_async::<LinkCheckJob>(pool_size * 4);

        let workers = (0..pool_size)
            .map(|_| {
                let analyzer = Arc::clone(&analyzer);
                let cancel = cancel.clone();
                let jobs_rx: AsyncReceiver<LinkCheckJob> = jobs_rx.clone();

                tokio::spawn(async move {
                    while let Ok(job) = jobs_rx.recv().await {
                        let probe = analyzer.probe_link(&cancel, &job.url).await;
                        let _ = job
                            .result_tx
                            .send(LinkCheckOutcome {
                                idx: job.idx,
                                probe,
                            })
                            .await;
                    }
                })
            })
            .collect();

        Self { jobs_tx, workers }
    }

    pub(crate) fn jobs(&self) -> AsyncSender<LinkCheckJob> {
        self.jobs_tx.clone()
    }

    /// Closes the job channel and waits for the workers to drain.
    pub(crate) async fn stop(self) {
        self.jobs_tx.close();

        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Submits `resolved` links to the pool and collects their outcomes.
///
/// Returns one slot per input link, in input order. Cancellation mid-feed
/// stops submitting; unsubmitted and unanswered slots stay `None`.
pub(crate) async fn run_link_checks(
    cancel: &CancellationToken,
    jobs_tx: &AsyncSender<LinkCheckJob>,
    resolved: &[String],
) -> Vec<Option<LinkProbe>> {
    let mut results: Vec<Option<LinkProbe>> = vec![None; resolved.len()];
    if resolved.is_empty() {
        return results;
    }

    let (result_tx, result_rx) = kanal::bounded_async::<LinkCheckOutcome>(resolved.len());

    let mut sent = 0;
    for (idx, absolute_url) in resolved.iter().enumerate() {
        let job = LinkCheckJob {
            idx,
            url: absolute_url.clone(),
            result_tx: result_tx.clone(),
        };

        let submitted = tokio::select! {
            _ = cancel.cancelled() => false,
            result = jobs_tx.send(job) => result.is_ok(),
        };

        if !submitted {
            break;
        }

        sent += 1;
    }

    for _ in 0..sent {
        match result_rx.recv().await {
            Ok(outcome) => results[outcome.idx] = Some(outcome.probe),
            Err(_) => break,
        }
    }

    results
}

/// Splits ordered probe results into deduplicated broken links and crawl
/// candidates.
///
/// Broken links are deduplicated by canonical form; the canonical form is
/// also the reported URL. Reachable links pass through in input order.
pub(crate) fn build_link_results(
    resolved: &[String],
    results: Vec<Option<LinkProbe>>,
) -> (Vec<BrokenLink>, Vec<String>) {
    let mut broken_links = Vec::new();
    let mut crawl_links = Vec::new();
    let mut seen_broken = std::collections::HashSet::new();

    for (idx, probe) in results.into_iter().enumerate() {
        match probe {
            None | Some(LinkProbe::Skipped) => continue,
            Some(LinkProbe::Reachable) => crawl_links.push(resolved[idx].clone()),
            Some(LinkProbe::Broken(link)) => {
                let canonical = canonical_broken_url(&link.url);
                if !seen_broken.insert(canonical.clone()) {
                    continue;
                }

                broken_links.push(BrokenLink {
                    url: canonical,
                    ..link
                });
            }
        }
    }

    (broken_links, crawl_links)
}
