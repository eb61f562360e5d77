// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache storage contract.

use std::time::Duration;

/// Trait for the key-value stores the Taskflight engines commit outcomes to.
///
/// Implementations are internally synchronized; callers share one store
/// across threads without external locking.
///
/// The value slot is `Option<V>` so that a deliberately stored null is
/// distinguishable from an absent entry:
///
/// - `get` returning `None` means *miss* — nothing is stored under the key.
/// - `get` returning `Some(None)` means a *cached null* — a lookup ran and
///   found nothing, and that outcome itself was stored.
pub trait CacheStore<K, V>: Send + Sync {
    /// Reads the entry for `key`, if one is stored and not yet expired.
    fn get(&self, key: &K) -> Option<Option<V>>;

    /// Stores a value (or a null outcome) under `key`.
    ///
    /// `ttl` overrides the store's default lifetime for this entry.
    /// Returns `false` if the store refused the entry (for example because
    /// the key failed validation); a refused entry is not stored, and the
    /// caller decides what that means for its own delivery obligations.
    fn set(&self, key: &K, value: Option<V>, ttl: Option<Duration>) -> bool;

    /// Removes the entry for `key`, if any.
    fn remove(&self, key: &K);

    /// Returns the number of live entries.
    fn len(&self) -> u64;

    /// Returns true if the store holds no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
