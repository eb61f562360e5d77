// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory cache implementation backed by moka.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

use crate::builder::MemoryCacheBuilder;
use crate::statistics::{CacheRecord, CacheStatistics, Counters};
use crate::store::CacheStore;

pub(crate) type CostFn<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;
pub(crate) type ValidatorFn<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;
pub(crate) type StatisticsFn<K> = Arc<dyn Fn(&CacheStatistics, &CacheRecord<K>) + Send + Sync>;

/// Fixed byte charge per entry when a byte budget is configured, covering
/// the key, the entry metadata, and the backend's bookkeeping.
const ENTRY_OVERHEAD: u64 = 64;

/// A stored entry: the payload (possibly a cached null) plus its lifetime.
#[derive(Clone)]
struct StoredEntry<V> {
    value: Option<V>,
    expires_at: Instant,
    ttl: Duration,
    weight: u32,
}

/// Per-entry expiration policy: every entry carries its own TTL, fixed at
/// store time (default TTL or per-set override, plus jitter).
struct EntryExpiry;

impl<K, V> Expiry<K, StoredEntry<V>> for EntryExpiry {
    fn expire_after_create(&self, _key: &K, entry: &StoredEntry<V>, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &StoredEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// A TTL- and capacity-bounded in-memory cache with cached-null support.
///
/// Cloning is cheap and clones share the same storage. The cache is
/// internally synchronized and safe to share across threads.
///
/// Expired entries read as misses immediately: the read path checks each
/// entry's deadline itself rather than relying on the backend's eviction
/// timing.
///
/// # Examples
///
/// ```
/// use flightcache::{CacheStore, MemoryCache};
///
/// let cache = MemoryCache::<String, i32>::new();
///
/// cache.set(&"key".to_string(), Some(42), None);
/// assert_eq!(cache.get(&"key".to_string()), Some(Some(42)));
///
/// cache.remove(&"key".to_string());
/// assert_eq!(cache.get(&"key".to_string()), None);
/// ```
pub struct MemoryCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Shared<K, V>>,
}

struct Shared<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<K, StoredEntry<V>>,
    default_ttl: Duration,
    null_ttl: Duration,
    ttl_jitter: Duration,
    cost_provider: Option<CostFn<V>>,
    key_validator: Option<ValidatorFn<K>>,
    statistics: Option<StatisticsFn<K>>,
    counters: Counters,
}

impl<K, V> Clone for MemoryCache<K, V>
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

impl<K, V> Default for MemoryCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a cache.
    #[must_use]
    pub fn builder() -> MemoryCacheBuilder<K, V> {
        MemoryCacheBuilder::new()
    }

    /// Returns a snapshot of the lifetime counters.
    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        self.inner.counters.snapshot()
    }

    pub(crate) fn from_builder(builder: MemoryCacheBuilder<K, V>) -> Self {
        let mut moka_builder = Cache::builder().expire_after(EntryExpiry);

        if let Some(megabytes) = builder.max_memory_mb {
            moka_builder = moka_builder
                .weigher(|_key, entry: &StoredEntry<V>| entry.weight)
                .max_capacity(megabytes.saturating_mul(1024 * 1024));
        } else {
            moka_builder = moka_builder.max_capacity(builder.max_entries);
        }

        if let Some(name) = builder.name.as_deref() {
            moka_builder = moka_builder.name(name);
        }

        Self {
            inner: Arc::new(Shared {
                cache: moka_builder.build(),
                default_ttl: builder.default_ttl,
                null_ttl: builder.null_ttl,
                ttl_jitter: builder.ttl_jitter,
                cost_provider: builder.cost_provider,
                key_validator: builder.key_validator,
                statistics: builder.statistics,
                counters: Counters::default(),
            }),
        }
    }

    fn report_with(&self, make_record: impl FnOnce() -> CacheRecord<K>) {
        if let Some(hook) = &self.inner.statistics {
            hook(&self.inner.counters.snapshot(), &make_record());
        }
    }

    fn jitter(&self) -> Duration {
        let range = self.inner.ttl_jitter;
        if range.is_zero() {
            return Duration::ZERO;
        }
        let nanos = u64::try_from(range.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(fastrand::u64(0..nanos))
    }
}

impl<K, V> CacheStore<K, V> for MemoryCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<Option<V>> {
        let shared = &self.inner;
        match shared.cache.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                shared.counters.record_hit();
                self.report_with(|| CacheRecord::Hit { key: key.clone() });
                Some(entry.value)
            }
            Some(_) => {
                // Expired but not yet evicted by the backend.
                shared.cache.invalidate(key);
                shared.counters.record_miss();
                self.report_with(|| CacheRecord::Miss { key: key.clone() });
                None
            }
            None => {
                shared.counters.record_miss();
                self.report_with(|| CacheRecord::Miss { key: key.clone() });
                None
            }
        }
    }

    fn set(&self, key: &K, value: Option<V>, ttl: Option<Duration>) -> bool {
        let shared = &self.inner;

        if let Some(validator) = &shared.key_validator
            && !validator(key)
        {
            shared.counters.record_refusal();
            self.report_with(|| CacheRecord::Refused { key: key.clone() });
            return false;
        }

        let base_ttl = ttl.unwrap_or(if value.is_some() { shared.default_ttl } else { shared.null_ttl });
        let entry_ttl = base_ttl.saturating_add(self.jitter());
        let cost = value
            .as_ref()
            .and_then(|v| shared.cost_provider.as_ref().map(|price| price(v)))
            .unwrap_or(0);
        let weight = u32::try_from(cost.saturating_add(ENTRY_OVERHEAD).min(u64::from(u32::MAX))).unwrap_or(u32::MAX);

        shared.cache.insert(
            key.clone(),
            StoredEntry {
                value,
                expires_at: Instant::now() + entry_ttl,
                ttl: entry_ttl,
                weight,
            },
        );
        shared.counters.record_store();
        self.report_with(|| CacheRecord::Stored { key: key.clone(), cost });
        true
    }

    fn remove(&self, key: &K) {
        self.inner.cache.invalidate(key);
        self.inner.counters.record_removal();
        self.report_with(|| CacheRecord::Removed { key: key.clone() });
    }

    fn len(&self) -> u64 {
        // entry_count is eventually consistent; draining the backend's
        // pending work first makes it exact.
        self.inner.cache.run_pending_tasks();
        self.inner.cache.entry_count()
    }
}

impl<K, V> std::fmt::Debug for MemoryCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("name", &self.inner.cache.name())
            .field("default_ttl", &self.inner.default_ttl)
            .field("null_ttl", &self.inner.null_ttl)
            .finish_non_exhaustive()
    }
}
