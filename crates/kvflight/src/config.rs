// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fetcher configuration: provider shapes, admission priority, builder.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use flightcache::{CacheStore, MemoryCache};
use flightline::Dispatcher;
use parking_lot::Mutex;

use crate::error::{BoxError, ConfigError, FetchError};
use crate::fetcher::KvFetcher;
use crate::flight::{FlightState, Inner};

/// The terminal outcome delivered for one key: the fetched value, a fetched
/// null, or the provider's final error.
pub type FetchOutcome<V> = Result<Option<V>, FetchError>;

/// The completion callback handed to a monofetch provider.
///
/// Being `FnOnce`, a reply can only be consumed once; a double completion is
/// unrepresentable.
pub type MonoReply<V> = Box<dyn FnOnce(Result<Option<V>, BoxError>) + Send>;

/// The completion callback handed to a multifetch provider.
///
/// On success the provider returns a map of outcomes for the requested
/// batch; a key omitted from the map is treated as a fetched null.
pub type BatchReply<K, V> = Box<dyn FnOnce(Result<HashMap<K, Option<V>>, BoxError>) + Send>;

pub(crate) type MonofetchFn<K, V> = Arc<dyn Fn(K, MonoReply<V>) + Send + Sync>;
pub(crate) type MultifetchFn<K, V> = Arc<dyn Fn(Vec<K>, BatchReply<K, V>) + Send + Sync>;

/// The configured provider shape.
pub(crate) enum DataProvider<K, V> {
    /// One key per invocation.
    Mono(MonofetchFn<K, V>),
    /// Up to `max_batch` keys per invocation.
    Multi {
        max_batch: usize,
        fetch: MultifetchFn<K, V>,
    },
}

impl<K, V> std::fmt::Debug for DataProvider<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono(_) => f.debug_struct("Mono").finish_non_exhaustive(),
            Self::Multi { max_batch, .. } => f.debug_struct("Multi").field("max_batch", max_batch).finish_non_exhaustive(),
        }
    }
}

/// Order in which pending keys are admitted once the gate has room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyPriority {
    /// Newest-enqueued keys first. The default: the keys a caller asked for
    /// most recently are the ones it is waiting on right now.
    #[default]
    Lifo,
    /// Oldest-enqueued keys first.
    Fifo,
}

/// Builder for configuring a [`KvFetcher`].
///
/// # Examples
///
/// ```
/// use kvflight::KvFetcher;
///
/// let fetcher = KvFetcher::<String, String>::builder()
///     .monofetch(|key, reply| reply(Ok(Some(format!("value_{key}")))))
///     .retry(2)
///     .max_concurrency(4)
///     .build()
///     .unwrap();
/// # let _ = fetcher;
/// ```
pub struct KvFetcherBuilder<K, V, S = MemoryCache<K, V>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    provider: Option<DataProvider<K, V>>,
    retry_count: u32,
    max_concurrency: usize,
    priority: KeyPriority,
    store: S,
    callback_context: Dispatcher,
}

impl<K, V> KvFetcherBuilder<K, V, MemoryCache<K, V>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            provider: None,
            retry_count: 0,
            max_concurrency: 4,
            priority: KeyPriority::default(),
            store: MemoryCache::new(),
            callback_context: Dispatcher::default(),
        }
    }
}

impl<K, V, S> KvFetcherBuilder<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    /// Configures a single-key data provider.
    ///
    /// The provider is handed one key and a reply; it must eventually
    /// consume the reply exactly once, from any thread.
    #[must_use]
    pub fn monofetch<F>(mut self, fetch: F) -> Self
    where
        F: Fn(K, MonoReply<V>) + Send + Sync + 'static,
    {
        self.provider = Some(DataProvider::Mono(Arc::new(fetch)));
        self
    }

    /// Configures a batching data provider.
    ///
    /// Pending keys are drained greedily into batches of up to `max_batch`
    /// at admission time; each batch counts as one invocation against the
    /// concurrency gate.
    #[must_use]
    pub fn multifetch<F>(mut self, max_batch: usize, fetch: F) -> Self
    where
        F: Fn(Vec<K>, BatchReply<K, V>) + Send + Sync + 'static,
    {
        self.provider = Some(DataProvider::Multi {
            max_batch,
            fetch: Arc::new(fetch),
        });
        self
    }

    /// Sets how many times a failed provider invocation is retried.
    ///
    /// The default of 0 means a single attempt. Retries are immediate and
    /// hold their gate slot across attempts.
    #[must_use]
    pub fn retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Bounds the number of simultaneously active provider invocations.
    ///
    /// Defaults to 4. Zero is rejected at [`build`](Self::build).
    #[must_use]
    pub fn max_concurrency(mut self, bound: usize) -> Self {
        self.max_concurrency = bound;
        self
    }

    /// Sets the admission order for pending keys.
    #[must_use]
    pub fn priority(mut self, priority: KeyPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the execution context user callbacks are delivered on.
    ///
    /// Defaults to [`Dispatcher::Inline`].
    #[must_use]
    pub fn callback_context(mut self, context: Dispatcher) -> Self {
        self.callback_context = context;
        self
    }

    /// Replaces the default memory cache with a configured one.
    #[must_use]
    pub fn memory(self, cache: MemoryCache<K, V>) -> KvFetcherBuilder<K, V, MemoryCache<K, V>> {
        self.store(cache)
    }

    /// Replaces the backing store with any [`CacheStore`] implementation.
    #[must_use]
    pub fn store<S2>(self, store: S2) -> KvFetcherBuilder<K, V, S2>
    where
        S2: CacheStore<K, V> + 'static,
    {
        KvFetcherBuilder {
            provider: self.provider,
            retry_count: self.retry_count,
            max_concurrency: self.max_concurrency,
            priority: self.priority,
            store,
            callback_context: self.callback_context,
        }
    }

    /// Builds the fetcher.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if no provider was configured, if
    /// `max_concurrency` is zero, or if a multifetch provider was given a
    /// zero batch bound.
    pub fn build(self) -> Result<KvFetcher<K, V, S>, ConfigError> {
        let provider = self.provider.ok_or(ConfigError::MissingProvider)?;
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if let DataProvider::Multi { max_batch: 0, .. } = provider {
            return Err(ConfigError::ZeroBatch);
        }

        Ok(KvFetcher::from_inner(Arc::new(Inner {
            provider,
            retry_count: self.retry_count,
            max_concurrency: self.max_concurrency,
            priority: self.priority,
            store: self.store,
            callback_context: self.callback_context,
            state: Mutex::new(FlightState::new()),
        })))
    }
}

impl<K, V, S> std::fmt::Debug for KvFetcherBuilder<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvFetcherBuilder")
            .field("provider", &self.provider)
            .field("retry_count", &self.retry_count)
            .field("max_concurrency", &self.max_concurrency)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
