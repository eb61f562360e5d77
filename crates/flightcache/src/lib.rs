// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! TTL- and capacity-bounded in-memory caching with cached-null support.
//!
//! This crate provides the storage layer consumed by the Taskflight
//! engines:
//!
//! - [`CacheStore`], the contract the engines program against. The read
//!   side distinguishes a *miss* from a *cached null*: `get` returns
//!   `Option<Option<V>>`, where the outer `None` means "nothing stored" and
//!   `Some(None)` means "a null outcome was stored deliberately".
//! - [`MemoryCache`], a moka-backed implementation with per-value and
//!   per-null TTLs, TTL jitter, entry-count or byte-cost capacity bounds,
//!   key validation, and an optional statistics callback.
//!
//! # Examples
//!
//! ```
//! use flightcache::{CacheStore, MemoryCache};
//! use std::time::Duration;
//!
//! let cache = MemoryCache::<String, i64>::builder()
//!     .default_ttl(Duration::from_secs(60))
//!     .max_entries(1_000)
//!     .build();
//!
//! cache.set(&"answer".to_string(), Some(42), None);
//! assert_eq!(cache.get(&"answer".to_string()), Some(Some(42)));
//!
//! // A cached null is a first-class outcome, distinct from a miss.
//! cache.set(&"absent".to_string(), None, None);
//! assert_eq!(cache.get(&"absent".to_string()), Some(None));
//! assert_eq!(cache.get(&"never-stored".to_string()), None);
//! ```

mod builder;
mod memory;
mod statistics;
mod store;

pub use builder::MemoryCacheBuilder;
pub use memory::MemoryCache;
pub use statistics::{CacheRecord, CacheStatistics};
pub use store::CacheStore;
