// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The public fetcher façade: intake, dedupe, cache probe, waiter
//! registration, and the async bridge.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use flightcache::{CacheStore, MemoryCache};
use parking_lot::Mutex;

use crate::config::{FetchOutcome, KvFetcherBuilder};
use crate::driver;
use crate::error::FetchError;
use crate::flight::{FlightState, InFlightRecord, Inner, KeyCallback, Waiter};

/// A multi-key coalescing fetcher over a pluggable data provider.
///
/// `KvFetcher` guarantees at most one in-flight provider invocation per key
/// at any moment: concurrent requests for a key that is already being
/// fetched attach as waiters and share the outcome. Terminal outcomes are
/// committed to the backing cache before waiters are drained, and every
/// waiter receives exactly one notification, in attachment order, on the
/// configured callback context.
///
/// Cloning is cheap; clones share the same engine.
///
/// # Examples
///
/// ```
/// use kvflight::KvFetcher;
///
/// futures::executor::block_on(async {
///     let fetcher = KvFetcher::<String, String>::builder()
///         .monofetch(|key, reply| reply(Ok(Some(format!("value_{key}")))))
///         .build()
///         .unwrap();
///
///     let value = fetcher.fetch("k1".to_string()).await.unwrap();
///     assert_eq!(value, Some("value_k1".to_string()));
/// });
/// ```
pub struct KvFetcher<K, V, S = MemoryCache<K, V>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<K, V, S>>,
}

impl<K, V, S> Clone for KvFetcher<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> KvFetcher<K, V, MemoryCache<K, V>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a builder, initially backed by a default [`MemoryCache`].
    #[must_use]
    pub fn builder() -> KvFetcherBuilder<K, V, MemoryCache<K, V>> {
        KvFetcherBuilder::new()
    }
}

impl<K, V, S> KvFetcher<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    pub(crate) fn from_inner(inner: Arc<Inner<K, V, S>>) -> Self {
        Self { inner }
    }

    /// Returns the backing store, for priming or explicit invalidation.
    #[must_use]
    pub fn cache(&self) -> &S {
        &self.inner.store
    }

    /// Fetches a batch of keys, delivering one callback invocation per key
    /// *occurrence* in the input.
    ///
    /// Duplicate keys collapse into one logical fetch; the callback still
    /// fires once per occurrence, with the shared outcome. An empty input
    /// is a no-op: the provider is never invoked and no callback fires.
    ///
    /// Cache hits (including cached nulls) are delivered immediately on the
    /// callback context. Misses either attach to the key's in-flight
    /// invocation or enqueue the key for admission through the concurrency
    /// gate.
    ///
    /// Delivery order across distinct keys is unspecified; for one key,
    /// callbacks fire in attachment order.
    pub fn fetch_with<C>(&self, keys: impl IntoIterator<Item = K>, callback: C)
    where
        C: Fn(&K, FetchOutcome<V>) + Send + Sync + 'static,
    {
        let callback: KeyCallback<K, V> = Arc::new(callback);

        // Collapse duplicates, keeping first-occurrence order and counts.
        let mut order: Vec<K> = Vec::new();
        let mut multiplicities: HashMap<K, usize> = HashMap::new();
        for key in keys {
            match multiplicities.entry(key) {
                Entry::Occupied(mut entry) => *entry.get_mut() += 1,
                Entry::Vacant(entry) => {
                    order.push(entry.key().clone());
                    entry.insert(1);
                }
            }
        }
        if order.is_empty() {
            return;
        }

        // Probe the cache outside the engine lock; the store has its own
        // synchronization.
        let mut hits: Vec<(K, Option<V>, usize)> = Vec::new();
        let mut misses: Vec<(K, usize)> = Vec::new();
        for key in order {
            let multiplicity = multiplicities.remove(&key).unwrap_or(1);
            match self.inner.store.get(&key) {
                Some(value) => hits.push((key, value, multiplicity)),
                None => misses.push((key, multiplicity)),
            }
        }

        // One critical section registers every miss: attach to the live
        // invocation window, or open a new one and mark the key pending.
        if !misses.is_empty() {
            let mut state = self.inner.state.lock();
            let FlightState { inflight, pending, .. } = &mut *state;
            for (key, multiplicity) in misses {
                let waiter = Waiter {
                    callback: Arc::clone(&callback),
                    multiplicity,
                };
                match inflight.entry(key) {
                    Entry::Occupied(mut entry) => {
                        tracing::trace!("attached waiter to in-flight key");
                        entry.get_mut().waiters.push(waiter);
                    }
                    Entry::Vacant(entry) => {
                        pending.push_back(entry.key().clone());
                        entry.insert(InFlightRecord { waiters: vec![waiter] });
                    }
                }
            }
        }

        for (key, value, multiplicity) in hits {
            let callback = Arc::clone(&callback);
            self.inner.callback_context.dispatch(move || {
                for _ in 0..multiplicity {
                    callback(&key, Ok(value.clone()));
                }
            });
        }

        driver::pump(&self.inner);
    }

    /// Fetches a single key. Equivalent to `fetch_with([key], callback)`.
    pub fn fetch_one_with<C>(&self, key: K, callback: C)
    where
        C: Fn(&K, FetchOutcome<V>) + Send + Sync + 'static,
    {
        self.fetch_with(std::iter::once(key), callback);
    }

    /// Fetches a batch of keys and delivers the complete outcome map in a
    /// single callback invocation, once every outcome is known.
    ///
    /// The map holds one entry per *distinct* key. An empty input is a
    /// no-op and the callback never fires.
    pub fn fetch_map_with<C>(&self, keys: impl IntoIterator<Item = K>, callback: C)
    where
        C: FnOnce(HashMap<K, FetchOutcome<V>>) + Send + 'static,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let distinct = keys.iter().collect::<HashSet<_>>().len();
        if distinct == 0 {
            return;
        }

        type Gather<K, V, C> = Mutex<(HashMap<K, FetchOutcome<V>>, usize, Option<C>)>;
        let gather: Arc<Gather<K, V, C>> = Arc::new(Mutex::new((HashMap::with_capacity(distinct), distinct, Some(callback))));

        self.fetch_with(keys, move |key, outcome| {
            let finished = {
                let mut gather = gather.lock();
                let (outcomes, remaining, callback) = &mut *gather;
                if outcomes.contains_key(key) {
                    // Occurrence repeats deliver the same outcome; record once.
                    None
                } else {
                    outcomes.insert(key.clone(), outcome);
                    *remaining -= 1;
                    if *remaining == 0 {
                        callback.take().map(|callback| (callback, std::mem::take(outcomes)))
                    } else {
                        None
                    }
                }
            };
            if let Some((callback, outcomes)) = finished {
                callback(outcomes);
            }
        });
    }

    /// Fetches a single key, suspending until the outcome is delivered.
    ///
    /// A provider failure surfaces as the `Err` arm of the returned
    /// `Result`; a fetched null as `Ok(None)`.
    pub async fn fetch(&self, key: K) -> FetchOutcome<V> {
        let (tx, rx) = futures::channel::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        self.fetch_one_with(key, move |_key, outcome| {
            if let Some(tx) = tx.lock().take() {
                drop(tx.send(outcome));
            }
        });
        rx.await.unwrap_or(Err(FetchError::Dropped))
    }

    /// Fetches a batch of keys, suspending until every outcome is known.
    ///
    /// Returns one entry per distinct key; an empty input yields an empty
    /// map without invoking the provider.
    pub async fn fetch_map(&self, keys: impl IntoIterator<Item = K>) -> HashMap<K, FetchOutcome<V>> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.fetch_map_with(keys, move |outcomes| drop(tx.send(outcomes)));
        rx.await.unwrap_or_default()
    }
}

impl<K, V, S> std::fmt::Debug for KvFetcher<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("KvFetcher")
            .field("provider", &self.inner.provider)
            .field("in_flight", &state.inflight.len())
            .field("pending", &state.pending.len())
            .field("active", &state.active)
            .finish_non_exhaustive()
    }
}
