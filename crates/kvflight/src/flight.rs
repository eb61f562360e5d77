// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared engine state: the in-flight table, pending queue, and gate
//! counters, all guarded by one mutex per fetcher instance.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use flightline::Dispatcher;
use parking_lot::Mutex;

use crate::config::{DataProvider, FetchOutcome, KeyPriority};

/// A per-key callback registration shared by every key of one `fetch_with`
/// call.
pub(crate) type KeyCallback<K, V> = Arc<dyn Fn(&K, FetchOutcome<V>) + Send + Sync>;

/// One pending delivery: the callback and how many occurrences of the key
/// the originating call carried.
pub(crate) struct Waiter<K, V> {
    pub callback: KeyCallback<K, V>,
    pub multiplicity: usize,
}

/// The coalescing point for one key: every waiter attached during the
/// current provider-invocation window, in attachment order.
pub(crate) struct InFlightRecord<K, V> {
    pub waiters: Vec<Waiter<K, V>>,
}

/// Everything the engine mutex protects.
///
/// Critical sections against this state stay pure: no user callbacks, no
/// provider invocations, no cache I/O.
pub(crate) struct FlightState<K, V> {
    /// Key -> current invocation window. A key is present from the moment a
    /// first waiter registers until its terminal outcome is drained.
    pub inflight: HashMap<K, InFlightRecord<K, V>>,
    /// Keys awaiting admission through the gate, in enqueue order.
    pub pending: VecDeque<K>,
    /// Number of provider invocations currently running. A batch counts
    /// once.
    pub active: usize,
}

impl<K, V> FlightState<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inflight: HashMap::new(),
            pending: VecDeque::new(),
            active: 0,
        }
    }

    /// Pops the next key to admit, honoring the configured priority.
    pub fn take_next(&mut self, priority: KeyPriority) -> Option<K> {
        match priority {
            KeyPriority::Lifo => self.pending.pop_back(),
            KeyPriority::Fifo => self.pending.pop_front(),
        }
    }

    /// Drains up to `max_batch` pending keys into one batch.
    pub fn take_batch(&mut self, priority: KeyPriority, max_batch: usize) -> Vec<K> {
        let mut batch = Vec::with_capacity(max_batch.min(self.pending.len()));
        while batch.len() < max_batch {
            match self.take_next(priority) {
                Some(key) => batch.push(key),
                None => break,
            }
        }
        batch
    }
}

/// The shared core of a fetcher; public handles and in-flight reply
/// closures all hold an `Arc` of this.
pub(crate) struct Inner<K, V, S> {
    pub provider: DataProvider<K, V>,
    pub retry_count: u32,
    pub max_concurrency: usize,
    pub priority: KeyPriority,
    pub store: S,
    pub callback_context: Dispatcher,
    pub state: Mutex<FlightState<K, V>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_pending(keys: &[&str]) -> FlightState<String, ()> {
        let mut state = FlightState::new();
        for key in keys {
            state.pending.push_back((*key).to_string());
        }
        state
    }

    #[test]
    fn lifo_pops_newest_first() {
        let mut state = state_with_pending(&["a", "b", "c"]);
        assert_eq!(state.take_next(KeyPriority::Lifo), Some("c".to_string()));
        assert_eq!(state.take_next(KeyPriority::Lifo), Some("b".to_string()));
        assert_eq!(state.take_next(KeyPriority::Lifo), Some("a".to_string()));
        assert_eq!(state.take_next(KeyPriority::Lifo), None);
    }

    #[test]
    fn fifo_pops_oldest_first() {
        let mut state = state_with_pending(&["a", "b", "c"]);
        assert_eq!(state.take_next(KeyPriority::Fifo), Some("a".to_string()));
        assert_eq!(state.take_next(KeyPriority::Fifo), Some("b".to_string()));
        assert_eq!(state.take_next(KeyPriority::Fifo), Some("c".to_string()));
    }

    #[test]
    fn batch_drains_up_to_the_bound() {
        let mut state = state_with_pending(&["a", "b", "c", "d", "e"]);
        assert_eq!(state.take_batch(KeyPriority::Fifo, 3), vec!["a", "b", "c"]);
        assert_eq!(state.take_batch(KeyPriority::Fifo, 3), vec!["d", "e"]);
        assert!(state.take_batch(KeyPriority::Fifo, 3).is_empty());
    }

    #[test]
    fn lifo_batches_drain_newest_first() {
        let mut state = state_with_pending(&["a", "b", "c", "d"]);
        assert_eq!(state.take_batch(KeyPriority::Lifo, 3), vec!["d", "c", "b"]);
        assert_eq!(state.take_batch(KeyPriority::Lifo, 3), vec!["a"]);
    }
}
