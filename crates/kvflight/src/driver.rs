// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Provider driver: admission through the gate, invocation, retry,
//! outcome normalization, cache commit, and waiter drain.

use std::hash::Hash;
use std::sync::Arc;

use flightcache::CacheStore;
use flightline::SharedError;

use crate::config::{BatchReply, DataProvider, FetchOutcome, MonoReply, MonofetchFn, MultifetchFn};
use crate::error::FetchError;
use crate::flight::{Inner, Waiter};

/// One admitted unit of provider work.
enum Admission<K, V> {
    Single(MonofetchFn<K, V>, K),
    Batch(MultifetchFn<K, V>, Vec<K>),
}

/// Admits pending keys through the gate until it is full or the pending
/// queue is empty. Safe to call from any thread; never holds the state lock
/// while invoking a provider.
pub(crate) fn pump<K, V, S>(inner: &Arc<Inner<K, V, S>>)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    loop {
        let admission = {
            let mut state = inner.state.lock();
            if state.active >= inner.max_concurrency || state.pending.is_empty() {
                return;
            }
            state.active += 1;
            match &inner.provider {
                DataProvider::Mono(fetch) => match state.take_next(inner.priority) {
                    Some(key) => Admission::Single(Arc::clone(fetch), key),
                    None => {
                        state.active -= 1;
                        return;
                    }
                },
                DataProvider::Multi { max_batch, fetch } => {
                    let batch = state.take_batch(inner.priority, *max_batch);
                    if batch.is_empty() {
                        state.active -= 1;
                        return;
                    }
                    Admission::Batch(Arc::clone(fetch), batch)
                }
            }
        };

        match admission {
            Admission::Single(fetch, key) => {
                tracing::debug!("admitted one key for monofetch");
                run_single(Arc::clone(inner), fetch, key, 1);
            }
            Admission::Batch(fetch, keys) => {
                tracing::debug!(batch = keys.len(), "admitted batch for multifetch");
                run_batch(Arc::clone(inner), fetch, keys, 1);
            }
        }
    }
}

/// Invokes the monofetch provider for one key. On failure, retries
/// immediately while attempts remain, holding the gate slot throughout.
fn run_single<K, V, S>(inner: Arc<Inner<K, V, S>>, fetch: MonofetchFn<K, V>, key: K, attempt: u32)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    let reply_inner = Arc::clone(&inner);
    let reply_fetch = Arc::clone(&fetch);
    let reply_key = key.clone();

    let reply: MonoReply<V> = Box::new(move |result| match result {
        Ok(value) => {
            settle_key(&reply_inner, &reply_key, Ok(value));
            release_slot(&reply_inner);
        }
        Err(error) => {
            if attempt <= reply_inner.retry_count {
                tracing::debug!(attempt, error = %error, "monofetch attempt failed, retrying");
                run_single(reply_inner, reply_fetch, reply_key, attempt + 1);
            } else {
                let error = FetchError::provider(attempt, SharedError::new(error));
                settle_key(&reply_inner, &reply_key, Err(error));
                release_slot(&reply_inner);
            }
        }
    });

    (fetch)(key, reply);
}

/// Invokes the multifetch provider for one batch. The batch retries and
/// fails as a unit; there is no partial success within a failed batch.
fn run_batch<K, V, S>(inner: Arc<Inner<K, V, S>>, fetch: MultifetchFn<K, V>, keys: Vec<K>, attempt: u32)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    let reply_inner = Arc::clone(&inner);
    let reply_fetch = Arc::clone(&fetch);
    let reply_keys = keys.clone();

    let reply: BatchReply<K, V> = Box::new(move |result| match result {
        Ok(mut outcomes) => {
            for key in &reply_keys {
                // A key omitted from the success map is a fetched null.
                let value = outcomes.remove(key).flatten();
                settle_key(&reply_inner, key, Ok(value));
            }
            release_slot(&reply_inner);
        }
        Err(error) => {
            if attempt <= reply_inner.retry_count {
                tracing::debug!(attempt, batch = reply_keys.len(), error = %error, "multifetch attempt failed, retrying");
                run_batch(reply_inner, reply_fetch, reply_keys, attempt + 1);
            } else {
                let shared = SharedError::new(error);
                for key in &reply_keys {
                    settle_key(&reply_inner, key, Err(FetchError::provider(attempt, shared.clone())));
                }
                release_slot(&reply_inner);
            }
        }
    });

    (fetch)(keys, reply);
}

/// Commits a terminal outcome for one key and drains its waiters.
///
/// The cache commit happens before any waiter observes the outcome. A
/// validator refusal skips the commit only; delivery is unaffected.
fn settle_key<K, V, S>(inner: &Arc<Inner<K, V, S>>, key: &K, outcome: FetchOutcome<V>)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    if let Ok(value) = &outcome {
        let _ = inner.store.set(key, value.clone(), None);
    }

    let record = inner.state.lock().inflight.remove(key);
    if let Some(record) = record {
        deliver(inner, key.clone(), record.waiters, outcome);
    }
}

/// Hands one key's waiters to the callback context as a single task, so
/// delivery order within the key equals attachment order.
fn deliver<K, V, S>(inner: &Arc<Inner<K, V, S>>, key: K, waiters: Vec<Waiter<K, V>>, outcome: FetchOutcome<V>)
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    S: 'static,
{
    if waiters.is_empty() {
        return;
    }
    inner.callback_context.dispatch(move || {
        for waiter in waiters {
            for _ in 0..waiter.multiplicity {
                (waiter.callback)(&key, outcome.clone());
            }
        }
    });
}

/// Releases one gate slot and admits more pending work.
fn release_slot<K, V, S>(inner: &Arc<Inner<K, V, S>>)
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
{
    {
        let mut state = inner.state.lock();
        state.active = state.active.saturating_sub(1);
    }
    pump(inner);
}
