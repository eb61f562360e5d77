// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring memory caches.
//!
//! The builder abstracts the underlying moka configuration behind a stable
//! surface: lifetimes, capacity bounds, cost accounting, key validation,
//! and statistics reporting are all configured here without exposing moka's
//! types.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::memory::{CostFn, MemoryCache, StatisticsFn, ValidatorFn};
use crate::statistics::{CacheRecord, CacheStatistics};

/// Builder for configuring a [`MemoryCache`].
///
/// # Examples
///
/// ```
/// use flightcache::MemoryCache;
/// use std::time::Duration;
///
/// let cache = MemoryCache::<String, Vec<u8>>::builder()
///     .default_ttl(Duration::from_secs(300))
///     .null_ttl(Duration::from_secs(30))
///     .ttl_jitter(Duration::from_secs(10))
///     .max_memory_mb(64)
///     .cost_provider(|blob: &Vec<u8>| blob.len() as u64)
///     .key_validator(|key: &String| !key.is_empty())
///     .build();
/// # let _ = cache;
/// ```
pub struct MemoryCacheBuilder<K, V> {
    pub(crate) name: Option<String>,
    pub(crate) default_ttl: Duration,
    pub(crate) null_ttl: Duration,
    pub(crate) ttl_jitter: Duration,
    pub(crate) max_entries: u64,
    pub(crate) max_memory_mb: Option<u64>,
    pub(crate) cost_provider: Option<CostFn<V>>,
    pub(crate) key_validator: Option<ValidatorFn<K>>,
    pub(crate) statistics: Option<StatisticsFn<K>>,
}

impl<K, V> Default for MemoryCacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryCacheBuilder<K, V> {
    /// Creates a new builder with default settings.
    ///
    /// Defaults: 120 s TTL for values, 30 s TTL for cached nulls, no
    /// jitter, a 1024-entry capacity bound, no byte budget, no validator,
    /// and no statistics callback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            default_ttl: Duration::from_secs(120),
            null_ttl: Duration::from_secs(30),
            ttl_jitter: Duration::ZERO,
            max_entries: 1024,
            max_memory_mb: None,
            cost_provider: None,
            key_validator: None,
            statistics: None,
        }
    }

    /// Sets a name for the cache, visible in debugging output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the time-to-live applied to stored values.
    ///
    /// A per-entry TTL passed to `set` takes precedence over this default.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the time-to-live applied to cached nulls.
    ///
    /// Null outcomes usually deserve a shorter lifetime than real values:
    /// the absent thing may come into existence at any moment.
    #[must_use]
    pub fn null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    /// Adds a uniformly random `[0, jitter)` extension to every TTL.
    ///
    /// Spreads out the expiry of entries stored together, so a burst of
    /// stores does not become a burst of refetches one TTL later.
    #[must_use]
    pub fn ttl_jitter(mut self, jitter: Duration) -> Self {
        self.ttl_jitter = jitter;
        self
    }

    /// Sets the entry-count capacity bound.
    ///
    /// Ignored when [`max_memory_mb`](Self::max_memory_mb) is set; the byte
    /// budget is the stricter accounting and wins.
    #[must_use]
    pub fn max_entries(mut self, capacity: u64) -> Self {
        self.max_entries = capacity;
        self
    }

    /// Bounds the cache by total byte cost instead of entry count.
    ///
    /// Each entry is charged its [`cost_provider`](Self::cost_provider)
    /// bytes plus a fixed per-entry overhead.
    #[must_use]
    pub fn max_memory_mb(mut self, megabytes: u64) -> Self {
        self.max_memory_mb = Some(megabytes);
        self
    }

    /// Sets the function that prices a value in bytes.
    #[must_use]
    pub fn cost_provider<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> u64 + Send + Sync + 'static,
    {
        self.cost_provider = Some(Arc::new(f));
        self
    }

    /// Sets the key validator.
    ///
    /// A key the validator rejects is never stored; `set` returns `false`
    /// and records a refusal.
    #[must_use]
    pub fn key_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.key_validator = Some(Arc::new(f));
        self
    }

    /// Sets a callback invoked on every cache event.
    ///
    /// The callback receives a counter snapshot and the record describing
    /// the event. It runs on the thread performing the cache operation, so
    /// it should be quick.
    #[must_use]
    pub fn statistics<F>(mut self, f: F) -> Self
    where
        F: Fn(&CacheStatistics, &CacheRecord<K>) + Send + Sync + 'static,
    {
        self.statistics = Some(Arc::new(f));
        self
    }

    /// Builds the configured [`MemoryCache`].
    #[must_use]
    pub fn build(self) -> MemoryCache<K, V>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        MemoryCache::from_builder(self)
    }
}

impl<K, V> std::fmt::Debug for MemoryCacheBuilder<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheBuilder")
            .field("name", &self.name)
            .field("default_ttl", &self.default_ttl)
            .field("null_ttl", &self.null_ttl)
            .field("ttl_jitter", &self.ttl_jitter)
            .field("max_entries", &self.max_entries)
            .field("max_memory_mb", &self.max_memory_mb)
            .finish_non_exhaustive()
    }
}
