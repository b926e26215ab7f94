//! Request coalescing.
//!
//! [`SingleFlight::run`] executes at most one piece of work per key at a
//! time. Callers arriving while the work is running wait for it and receive
//! a clone of its result. The work runs on its own task, so a caller that
//! gives up (timeout, disconnect) stops waiting without cancelling it.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

/// The shared work ended without producing a result (it panicked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("in-flight work aborted before completing")]
pub struct FlightAborted;

type Flights<K, T> = DashMap<K, watch::Receiver<Option<T>>>;

/// Coalesces concurrent work by key.
pub struct SingleFlight<K, T> {
    flights: Arc<Flights<K, T>>,
}

impl<K, T> Clone for SingleFlight<K, T> {
    fn clone(&self) -> Self {
        SingleFlight {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        SingleFlight {
            flights: Arc::new(DashMap::new()),
        }
    }
}

impl<K, T> std::fmt::Debug for SingleFlight<K, T>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}

/// Releases the key when the work task ends, even by panic.
struct Release<K: Eq + Hash, T> {
    flights: Arc<Flights<K, T>>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Release<K, T> {
    fn drop(&mut self) {
        self.flights.remove(&self.key);
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the run already in progress.
    ///
    /// `work` is only polled if this call starts a new flight.
    pub async fn run<F>(&self, key: K, work: F) -> Result<T, FlightAborted>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut rx = match self.flights.entry(key.clone()) {
            Entry::Occupied(flight) => flight.get().clone(),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                let release = Release {
                    flights: Arc::clone(&self.flights),
                    key,
                };
                tokio::spawn(async move {
                    let result = work.await;
                    // Release before publishing so a caller that sees the
                    // result and retries starts a fresh flight.
                    drop(release);
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        let result = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| FlightAborted)?;
        (*result).clone().ok_or(FlightAborted)
    }

    /// Number of keys with work currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}
