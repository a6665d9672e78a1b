//! Process-wide rate limiter
//!
//! Enforces a minimum interval between successive request starts. A single
//! instance is shared by every worker; the grant times it hands out are
//! monotonically non-decreasing across the process.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::{Canceled, Clock};

/// Minimum-interval limiter.
///
/// Each waiter reserves its slot (`last = next`) before sleeping, so N
/// concurrent waiters get N distinct, evenly spaced grant times instead of
/// all waking at the same instant. The mutex covers only the reservation;
/// the sleep itself happens unlocked.
pub struct RateLimiter {
    interval: chrono::Duration,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Creates a limiter enforcing `interval` between grants.
    ///
    /// Returns `None` for a zero interval: callers treat that as "no
    /// limiter configured".
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }

        let interval = chrono::Duration::from_std(interval).ok()?;

        Some(Self {
            interval,
            clock,
            last: Mutex::new(None),
        })
    }

    /// Blocks until the next allowed request time or cancellation.
    ///
    /// The first call records "now" and returns immediately. A cancelled
    /// wait does not release its reserved slot; by then the whole crawl is
    /// tearing down.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), Canceled> {
        let sleep_for = {
            let mut last = self.last.lock();
            let now = self.clock.now();

            match *last {
                None => {
                    *last = Some(now);
                    None
                }
                Some(prev) => {
                    let next = prev + self.interval;
                    if now < next {
                        *last = Some(next);
                        Some((next - now).to_std().unwrap_or_default())
                    } else {
                        *last = Some(now);
                        None
                    }
                }
            }
        };

        match sleep_for {
            Some(duration) => self.clock.sleep(cancel, duration).await,
            None => Ok(()),
        }
    }
}
