// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Concurrent access to one cache file from many tasks.

use oura_cache::db::CacheStore;
use oura_cache::models::{DailySleep, EntityType};
use oura_cache::time_utils::SystemClock;
use std::sync::Arc;

mod common;
use common::{day, sleep};

const NUM_WRITERS: u32 = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_and_readers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::open(dir.path(), Arc::new(SystemClock)).unwrap());

    let mut handles = vec![];
    for i in 0..NUM_WRITERS {
        let store = store.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let day = format!("2026-01-{:02}", i + 1);
            let record: DailySleep = serde_json::from_value(sleep(&day, 60 + i64::from(i))).unwrap();
            store.set(&record, 1)?;
            // Read back through whichever pooled connection comes next.
            store.get(EntityType::Sleep, &day)
        }));
    }

    for handle in handles {
        let read = handle.await.unwrap().unwrap();
        assert!(read.is_some());
    }

    let all = store
        .get_range(EntityType::Sleep, day("2026-01-01"), day("2026-01-31"))
        .unwrap();
    assert_eq!(all.len(), NUM_WRITERS as usize);
    assert_eq!(all[0].natural_key, "2026-01-16");
}

#[tokio::test]
async fn test_reopen_sees_previous_writes() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = CacheStore::open(dir.path(), Arc::new(SystemClock)).unwrap();
        let record: DailySleep = serde_json::from_value(sleep("2026-01-15", 80)).unwrap();
        store.set(&record, 24).unwrap();
    }

    let store = CacheStore::open(dir.path(), Arc::new(SystemClock)).unwrap();
    let row = store.get(EntityType::Sleep, "2026-01-15").unwrap().unwrap();
    let decoded: DailySleep = row.decode().unwrap();
    assert_eq!(decoded.score, Some(80));
}
