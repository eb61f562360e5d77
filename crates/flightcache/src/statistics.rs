// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache event reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of a cache's lifetime counters.
///
/// Handed to the statistics callback together with the [`CacheRecord`]
/// describing the event that produced the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Reads that found a live entry (including cached nulls).
    pub hits: u64,
    /// Reads that found nothing, or only an expired entry.
    pub misses: u64,
    /// Entries accepted and stored.
    pub stores: u64,
    /// Entries refused by the key validator.
    pub refusals: u64,
    /// Explicit removals.
    pub removals: u64,
}

/// A single cache event, passed to the statistics callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRecord<K> {
    /// A read found a live entry for the key.
    Hit {
        /// The key that was read.
        key: K,
    },
    /// A read found no live entry for the key.
    Miss {
        /// The key that was read.
        key: K,
    },
    /// An entry was stored.
    Stored {
        /// The key that was written.
        key: K,
        /// The byte cost charged against the capacity budget.
        cost: u64,
    },
    /// The key validator refused an entry.
    Refused {
        /// The key that failed validation.
        key: K,
    },
    /// An entry was explicitly removed.
    Removed {
        /// The key that was removed.
        key: K,
    },
}

/// Lifetime counters, updated lock-free on every cache operation.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    refusals: AtomicU64,
    removals: AtomicU64,
}

impl Counters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refusal(&self) {
        self.refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            refusals: self.refusals.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
        }
    }
}
