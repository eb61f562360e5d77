// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Multi-key coalescing fetcher with bounded concurrency, batching,
//! retries, and an in-memory cache.
//!
//! [`KvFetcher`] turns bursty, possibly duplicative per-key lookups into at
//! most one in-flight data-provider invocation per key:
//!
//! - Requests for a key that is already being fetched attach as *waiters*
//!   and share the outcome.
//! - New keys pass through a bounded-concurrency *gate*, admitted in LIFO
//!   or FIFO order, one key per invocation (monofetch) or greedily batched
//!   (multifetch).
//! - Terminal outcomes are committed to a TTL-bounded cache
//!   ([`flightcache`]) before any waiter observes them, and every waiter is
//!   notified exactly once, in attachment order, on a configurable
//!   callback context ([`flightline::Dispatcher`]).
//! - Failed invocations retry immediately up to a configured count, holding
//!   their gate slot across attempts; a fetched null is a first-class,
//!   cacheable outcome.
//!
//! # Example
//!
//! ```
//! use kvflight::{KeyPriority, KvFetcher};
//!
//! futures::executor::block_on(async {
//!     let fetcher = KvFetcher::<String, String>::builder()
//!         .multifetch(16, |keys, reply| {
//!             let outcomes = keys
//!                 .into_iter()
//!                 .map(|key| {
//!                     let value = format!("value_{key}");
//!                     (key, Some(value))
//!                 })
//!                 .collect();
//!             reply(Ok(outcomes));
//!         })
//!         .max_concurrency(2)
//!         .priority(KeyPriority::Fifo)
//!         .build()
//!         .unwrap();
//!
//!     let outcomes = fetcher.fetch_map(vec!["k1".to_string(), "k2".to_string()]).await;
//!     assert_eq!(outcomes.len(), 2);
//! });
//! ```

mod config;
mod driver;
mod error;
mod fetcher;
mod flight;

pub use config::{BatchReply, FetchOutcome, KeyPriority, KvFetcherBuilder, MonoReply};
pub use error::{BoxError, ConfigError, FetchError};
pub use fetcher::KvFetcher;

#[doc(inline)]
pub use flightcache::{CacheStore, MemoryCache};
#[doc(inline)]
pub use flightline::{Dispatcher, SharedError};
