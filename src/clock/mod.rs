//! Time source for the crawler
//!
//! Everything that reads the clock or sleeps goes through the [`Clock`]
//! trait so that tests can substitute a deterministic double. The rate
//! limiter, the fetcher's retry backoff, and report timestamps all share
//! one clock instance.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error returned when a sleep is interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation canceled")]
pub struct Canceled;

/// Clock abstraction: current time plus a cancellable sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Sleeps for `duration` or until `cancel` fires, whichever is first.
    ///
    /// A zero duration returns immediately, unless the token is already
    /// cancelled, in which case the cancellation is reported.
    async fn sleep(
        &self,
        cancel: &CancellationToken,
        duration: Duration,
    ) -> Result<(), Canceled>;
}

/// Production clock backed by real wall time and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(
        &self,
        cancel: &CancellationToken,
        duration: Duration,
    ) -> Result<(), Canceled> {
        if duration.is_zero() {
            if cancel.is_cancelled() {
                return Err(Canceled);
            }

            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(Canceled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        let cancel = CancellationToken::new();
        let result = SystemClock.sleep(&cancel, Duration::ZERO).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_zero_sleep_reports_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = SystemClock.sleep(&cancel, Duration::ZERO).await;
        assert_eq!(result, Err(Canceled));
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancellation() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = SystemClock.sleep(&cancel, Duration::from_secs(60)).await;
        assert_eq!(result, Err(Canceled));
    }

    #[tokio::test]
    async fn test_now_is_utc_and_monotonic_enough() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
