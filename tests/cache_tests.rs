mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use chrono::Utc;
use common::{FakeApi, krakow_stops};
use futures_util::future::join_all;
use tramspot::{
    cache::StopCache,
    store::{MemorySnapshotStore, SnapshotStore, StopSnapshot, ZipSnapshotStore},
};

const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_fetch() {
    let api = Arc::new(FakeApi {
        stop_delay: Duration::from_millis(200),
        ..FakeApi::with_stops(krakow_stops())
    });
    let cache = StopCache::new(api.clone(), Arc::new(MemorySnapshotStore::new()), WEEK);

    let results = join_all((0..8).map(|_| cache.stops())).await;

    assert_eq!(api.stop_fetches(), 1);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.len(), 5);
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
}

#[tokio::test(start_paused = true)]
async fn callers_spawned_during_flight_join_it() {
    let api = Arc::new(FakeApi {
        stop_delay: Duration::from_millis(200),
        ..FakeApi::with_stops(krakow_stops())
    });
    let cache = StopCache::new(api.clone(), Arc::new(MemorySnapshotStore::new()), WEEK);

    let early = tokio::spawn({
        let cache = cache.clone();
        async move { cache.stops().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.is_loaded().await);
    let late = cache.stops().await.unwrap();
    let early = early.await.unwrap().unwrap();

    assert_eq!(api.stop_fetches(), 1);
    assert!(Arc::ptr_eq(&early, &late));
    assert!(cache.is_loaded().await);
}

#[tokio::test]
async fn failed_fetch_leaves_cache_empty() {
    let api = Arc::new(FakeApi::with_stops(krakow_stops()));
    api.fail_stops.store(true, Ordering::SeqCst);
    let store = Arc::new(MemorySnapshotStore::new());
    let cache = StopCache::new(api.clone(), store.clone(), WEEK);

    assert!(cache.stops().await.is_err());
    assert!(!cache.is_loaded().await);
    assert!(store.load().unwrap().is_none());

    api.fail_stops.store(false, Ordering::SeqCst);
    assert_eq!(cache.stops().await.unwrap().len(), 5);
    assert_eq!(api.stop_fetches(), 2);
}

#[tokio::test]
async fn loaded_cache_is_reused() {
    let api = Arc::new(FakeApi::with_stops(krakow_stops()));
    let cache = StopCache::new(api.clone(), Arc::new(MemorySnapshotStore::new()), WEEK);
    let first = cache.stops().await.unwrap();
    let second = cache.stops().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(api.stop_fetches(), 1);
}

#[tokio::test]
async fn fetch_is_persisted() {
    let api = Arc::new(FakeApi::with_stops(krakow_stops()));
    let store = Arc::new(MemorySnapshotStore::new());
    let cache = StopCache::new(api, store.clone(), WEEK);
    cache.stops().await.unwrap();

    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.stops.len(), 5);
    assert!(!snapshot.is_expired(Utc::now(), WEEK));
}

#[tokio::test]
async fn warm_start_from_fresh_snapshot() {
    let api = Arc::new(FakeApi::with_stops(Vec::new()));
    let snapshot = StopSnapshot::new(
        krakow_stops().into(),
        Utc::now() - chrono::Duration::days(6),
    );
    let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot));
    let cache = StopCache::new(api.clone(), store, WEEK);

    assert_eq!(cache.stops().await.unwrap().len(), 5);
    assert_eq!(api.stop_fetches(), 0);
}

#[tokio::test]
async fn expired_snapshot_is_refetched() {
    let api = Arc::new(FakeApi::with_stops(krakow_stops()[..2].to_vec()));
    let snapshot = StopSnapshot::new(
        krakow_stops().into(),
        Utc::now() - chrono::Duration::days(8),
    );
    let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot));
    let cache = StopCache::new(api.clone(), store, WEEK);

    assert_eq!(cache.stops().await.unwrap().len(), 2);
    assert_eq!(api.stop_fetches(), 1);
}

#[tokio::test]
async fn expired_cache_is_refetched() {
    let api = Arc::new(FakeApi::with_stops(krakow_stops()));
    let cache = StopCache::new(api.clone(), Arc::new(MemorySnapshotStore::new()), Duration::ZERO);
    cache.stops().await.unwrap();
    std::thread::sleep(Duration::from_millis(5));
    cache.stops().await.unwrap();
    assert_eq!(api.stop_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_reaches_every_waiting_caller() {
    let api = Arc::new(FakeApi {
        stop_delay: Duration::from_millis(200),
        ..FakeApi::with_stops(krakow_stops())
    });
    api.fail_stops.store(true, Ordering::SeqCst);
    let cache = StopCache::new(api.clone(), Arc::new(MemorySnapshotStore::new()), WEEK);

    let results = join_all((0..5).map(|_| cache.stops())).await;

    assert_eq!(api.stop_fetches(), 1);
    assert!(results.iter().all(|result| result.is_err()));
    assert!(!cache.is_loaded().await);
}

#[tokio::test]
async fn unreadable_snapshot_is_refetched() {
    let path = std::env::temp_dir()
        .join(format!("tramspot-{}-cache-corrupt", std::process::id()))
        .join("stops_snapshot.zip");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"not a zip").unwrap();
    let api = Arc::new(FakeApi::with_stops(krakow_stops()));
    let store = Arc::new(ZipSnapshotStore::new(&path));
    let cache = StopCache::new(api.clone(), store.clone(), WEEK);

    assert_eq!(cache.stops().await.unwrap().len(), 5);
    assert_eq!(api.stop_fetches(), 1);
    assert_eq!(store.load().unwrap().unwrap().stops.len(), 5);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
