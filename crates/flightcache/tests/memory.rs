// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `MemoryCache`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use flightcache::{CacheRecord, CacheStore, MemoryCache};

#[test]
fn roundtrip_value() {
    let cache = MemoryCache::<String, i32>::new();
    let key = "key".to_string();

    assert_eq!(cache.get(&key), None);
    assert!(cache.set(&key, Some(42), None));
    assert_eq!(cache.get(&key), Some(Some(42)));
}

#[test]
fn cached_null_is_distinct_from_miss() {
    let cache = MemoryCache::<String, i32>::new();
    let stored_null = "stored".to_string();
    let never_stored = "missing".to_string();

    assert!(cache.set(&stored_null, None, None));

    assert_eq!(cache.get(&stored_null), Some(None));
    assert_eq!(cache.get(&never_stored), None);
}

#[test]
fn overwrite_replaces_the_entry() {
    let cache = MemoryCache::<String, i32>::new();
    let key = "key".to_string();

    cache.set(&key, Some(1), None);
    cache.set(&key, Some(2), None);

    assert_eq!(cache.get(&key), Some(Some(2)));
}

#[test]
fn remove_deletes_the_entry() {
    let cache = MemoryCache::<String, i32>::new();
    let key = "key".to_string();

    cache.set(&key, Some(42), None);
    cache.remove(&key);

    assert_eq!(cache.get(&key), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn expired_entry_reads_as_miss() {
    let cache = MemoryCache::<String, i32>::builder()
        .default_ttl(Duration::from_millis(40))
        .build();
    let key = "key".to_string();

    cache.set(&key, Some(42), None);
    assert_eq!(cache.get(&key), Some(Some(42)));

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(cache.get(&key), None);
}

#[test]
fn null_ttl_applies_to_cached_nulls() {
    let cache = MemoryCache::<String, i32>::builder()
        .default_ttl(Duration::from_secs(60))
        .null_ttl(Duration::from_millis(40))
        .build();
    let value_key = "value".to_string();
    let null_key = "null".to_string();

    cache.set(&value_key, Some(1), None);
    cache.set(&null_key, None, None);

    std::thread::sleep(Duration::from_millis(80));

    assert_eq!(cache.get(&value_key), Some(Some(1)));
    assert_eq!(cache.get(&null_key), None);
}

#[test]
fn per_set_ttl_overrides_the_default() {
    let cache = MemoryCache::<String, i32>::builder()
        .default_ttl(Duration::from_secs(60))
        .build();
    let key = "key".to_string();

    cache.set(&key, Some(42), Some(Duration::from_millis(40)));

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(cache.get(&key), None);
}

#[test]
fn validator_refuses_invalid_keys() {
    let cache = MemoryCache::<String, i32>::builder()
        .key_validator(|key: &String| !key.is_empty())
        .build();

    assert!(!cache.set(&String::new(), Some(42), None));
    assert_eq!(cache.len(), 0);

    assert!(cache.set(&"valid".to_string(), Some(42), None));
    assert_eq!(cache.len(), 1);

    let stats = cache.statistics();
    assert_eq!(stats.refusals, 1);
    assert_eq!(stats.stores, 1);
}

#[test]
fn entry_capacity_is_enforced() {
    let cache = MemoryCache::<u32, u32>::builder().max_entries(8).build();

    for i in 0..200 {
        cache.set(&i, Some(i), None);
    }

    assert!(cache.len() <= 8);
}

#[test]
fn byte_budget_evicts_costly_entries() {
    let cache = MemoryCache::<u32, Vec<u8>>::builder()
        .max_memory_mb(1)
        .cost_provider(|blob: &Vec<u8>| blob.len() as u64)
        .build();

    // ~4 MiB of payload against a 1 MiB budget.
    for i in 0..16 {
        cache.set(&i, Some(vec![0_u8; 256 * 1024]), None);
    }

    assert!(cache.len() < 16);
}

#[test]
fn statistics_counters_track_reads_and_writes() {
    let cache = MemoryCache::<String, i32>::new();
    let key = "key".to_string();

    cache.get(&key);
    cache.set(&key, Some(1), None);
    cache.get(&key);
    cache.remove(&key);

    let stats = cache.statistics();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.stores, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.removals, 1);
}

#[test]
fn statistics_callback_sees_each_event() {
    let records = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&records);

    let cache = MemoryCache::<String, i32>::builder()
        .statistics(move |_stats, record| sink.lock().unwrap().push(record.clone()))
        .build();
    let key = "key".to_string();

    cache.set(&key, Some(1), None);
    cache.get(&key);

    let seen = records.lock().unwrap();
    assert_eq!(
        *seen,
        vec![CacheRecord::Stored { key: key.clone(), cost: 0 }, CacheRecord::Hit { key: key.clone() }]
    );
}

#[test]
fn statistics_callback_snapshot_is_current() {
    let hits_seen = std::sync::Arc::new(AtomicU64::new(0));
    let sink = std::sync::Arc::clone(&hits_seen);

    let cache = MemoryCache::<String, i32>::builder()
        .statistics(move |stats, record| {
            if matches!(record, CacheRecord::Hit { .. }) {
                sink.store(stats.hits, Ordering::SeqCst);
            }
        })
        .build();
    let key = "key".to_string();

    cache.set(&key, Some(1), None);
    cache.get(&key);

    assert_eq!(hits_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn shared_clones_see_the_same_entries() {
    let cache = MemoryCache::<String, i32>::new();
    let clone = cache.clone();
    let key = "key".to_string();

    cache.set(&key, Some(42), None);

    assert_eq!(clone.get(&key), Some(Some(42)));
}

#[test]
fn concurrent_access_is_safe() {
    let cache = MemoryCache::<u32, u32>::builder().max_entries(100_000).build();

    let mut handles = Vec::new();
    for t in 0..8_u32 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..500 {
                let key = t * 1_000 + i;
                cache.set(&key, Some(key), None);
                assert_eq!(cache.get(&key), Some(Some(key)));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 4_000);
}

#[test]
fn jittered_entries_are_still_readable() {
    let cache = MemoryCache::<String, i32>::builder()
        .default_ttl(Duration::from_secs(60))
        .ttl_jitter(Duration::from_secs(10))
        .build();
    let key = "key".to_string();

    cache.set(&key, Some(42), None);
    assert_eq!(cache.get(&key), Some(Some(42)));
}
