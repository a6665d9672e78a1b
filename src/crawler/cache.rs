//! Single-flight memoization for fetch results
//!
//! The first caller for a key becomes the leader: a pending entry is
//! inserted under the map lock *before* any work starts, so concurrent
//! callers for the same key can never race into duplicate fetches. The
//! leader publishes the outcome exactly once; followers wait on the entry's
//! ready signal and read the stored value. Entries live for the whole
//! invocation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clock::Canceled;

type Slot<T> = Option<Arc<T>>;

/// Leader/follower handle for one key, returned by [`FlightCache::begin`].
pub(crate) enum Flight<T> {
    /// This caller computes the value and publishes it.
    Leader(Publisher<T>),
    /// Another caller is (or was) computing; wait for its value.
    Follower(watch::Receiver<Slot<T>>),
}

/// Write-once publisher held by the leader.
pub(crate) struct Publisher<T> {
    tx: watch::Sender<Slot<T>>,
}

impl<T> Publisher<T> {
    /// Stores the value and fires the ready signal.
    pub(crate) fn publish(self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.tx.send_replace(Some(value.clone()));

        value
    }
}

/// Mutex-guarded single-flight map keyed by absolute URL.
pub(crate) struct FlightCache<T> {
    entries: Mutex<HashMap<String, watch::Receiver<Slot<T>>>>,
}

impl<T> FlightCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Joins the flight for `key`, creating it if this is the first caller.
    pub(crate) fn begin(&self, key: &str) -> Flight<T> {
        let mut entries = self.entries.lock();

        if let Some(ready) = entries.get(key) {
            return Flight::Follower(ready.clone());
        }

        let (tx, rx) = watch::channel(None);
        entries.insert(key.to_string(), rx);

        Flight::Leader(Publisher { tx })
    }

    /// Drops the pending entry for `key`.
    ///
    /// Used when the leader gives up before fetching (cancellation during
    /// semaphore acquisition); followers already waiting still receive the
    /// published cancellation outcome.
    pub(crate) fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Waits for the flight's value or cancellation, whichever is first.
///
/// A follower being cancelled does not affect the in-flight computation.
pub(crate) async fn await_value<T>(
    mut ready: watch::Receiver<Slot<T>>,
    cancel: &CancellationToken,
) -> Result<Arc<T>, Canceled> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Canceled),
        value = ready.wait_for(|slot| slot.is_some()) => match value {
            Ok(slot) => (*slot).clone().ok_or(Canceled),
            Err(_) => Err(Canceled),
        },
    }
}
