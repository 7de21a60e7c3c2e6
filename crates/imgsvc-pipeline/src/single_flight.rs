//! # Single-Flight Coordination
//!
//! At most one computation per key is in progress within a process.
//! Concurrent callers for the same key await the leader's result instead of
//! starting their own.
//!
//! Each key maps to a shared `tokio::sync::OnceCell`. If the leader's future
//! is dropped before completing (caller cancelled, budget exceeded) the cell
//! stays empty and the next waiter runs its own computation. The entry is
//! removed once a result is available, so the map only holds keys with work
//! in flight.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// Deduplicates concurrent computations by key.
pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `compute` for `key` unless a computation for it is already in
    /// flight, in which case wait for that one.
    ///
    /// Returns the value and whether this caller ran the computation.
    pub async fn run<F, Fut>(&self, key: K, compute: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut calls = self.calls.lock();
            Arc::clone(
                calls
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let mut led = false;
        let value = cell
            .get_or_init(|| {
                led = true;
                compute()
            })
            .await
            .clone();

        let mut calls = self.calls.lock();
        if calls.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            calls.remove(&key);
        }
        (value, led)
    }

    /// Number of keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}
