//! Recent list: ordering, bounds and the lock-guarded rebuild.

mod common;

use common::{FaultyCache, Harness};
use courier::cache::{CacheStore, RECENT_LIST_LIMIT};
use courier::service::{ServiceError, ServiceSettings, RECENT_LOCK_OPERATION};
use futures::future::join_all;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

fn ids(list: &[courier::model::Notification]) -> Vec<i64> {
    list.iter().map(|n| n.id).collect()
}

#[tokio::test]
async fn test_newest_first() {
    let h = Harness::new();
    let a = h.create("a@example.com", None).await;
    let b = h.create("b@example.com", None).await;
    h.wait_for_clears(2).await;

    let recent = assert_ok!(h.service.get_recent().await);
    assert_eq!(ids(&recent), vec![b.id, a.id]);
}

#[tokio::test]
async fn test_empty_store_returns_empty_without_populating() {
    let h = Harness::new();

    let recent = assert_ok!(h.service.get_recent().await);
    assert!(recent.is_empty());
    assert_eq!(FaultyCache::count(&h.cache.populates), 0);

    // The lock is released even though nothing was cached.
    let key = h.cache.lock_key_for(RECENT_LOCK_OPERATION);
    assert!(!h.cache.inner.is_locked(&key));
}

#[tokio::test]
async fn test_bounded_and_strictly_descending() {
    let h = Harness::new();
    for i in 0..15 {
        h.create(&format!("user{i}@example.com"), None).await;
    }
    h.wait_for_clears(15).await;

    let recent = h.service.get_recent().await.unwrap();
    assert_eq!(recent.len(), RECENT_LIST_LIMIT);
    assert!(recent.windows(2).all(|w| w[0].created_at > w[1].created_at));

    // The cached copy obeys the same bounds and order.
    assert_eq!(h.cache.inner.recent_len(), RECENT_LIST_LIMIT);
    let cached = h.cache.inner.get_recent_list().await.unwrap();
    assert_eq!(cached, recent);
}

#[tokio::test]
async fn test_second_read_is_served_from_cache() {
    let h = Harness::new();
    h.create("a@example.com", None).await;
    h.wait_for_clears(1).await;

    let first = h.service.get_recent().await.unwrap();
    let second = h.service.get_recent().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(FaultyCache::count(&h.cache.populates), 1);
}

#[tokio::test]
async fn test_write_invalidates_recent_list() {
    let h = Harness::new();
    let a = h.create("a@example.com", None).await;
    h.wait_for_clears(1).await;
    assert_eq!(ids(&h.service.get_recent().await.unwrap()), vec![a.id]);

    let b = h.create("b@example.com", None).await;
    h.wait_for_clears(2).await;

    assert_eq!(ids(&h.service.get_recent().await.unwrap()), vec![b.id, a.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_reads_rebuild_once() {
    let h = Harness::new();
    for i in 0..3 {
        h.create(&format!("user{i}@example.com"), None).await;
    }
    h.wait_for_clears(3).await;
    h.cache.reset_counters();

    let readers = (0..20).map(|_| {
        let service = h.service.clone();
        tokio::spawn(async move { service.get_recent().await })
    });
    let results = join_all(readers).await;

    let expected = ids(&h.store.find_top_n_by_recency(RECENT_LIST_LIMIT).unwrap());
    for result in results {
        let recent = result.unwrap().unwrap();
        assert_eq!(ids(&recent), expected);
    }
    assert_eq!(FaultyCache::count(&h.cache.populates), 1);
}

#[tokio::test]
async fn test_lock_held_elsewhere_falls_back_after_wait() {
    let h = Harness::with_settings(ServiceSettings {
        lock_wait: Duration::from_millis(100),
        ..ServiceSettings::default()
    });
    let a = h.create("a@example.com", None).await;
    h.wait_for_clears(1).await;

    let key = h.cache.lock_key_for(RECENT_LOCK_OPERATION);
    assert!(h
        .cache
        .try_acquire_lock(&key, "someone-else", Duration::from_secs(30))
        .await
        .unwrap());

    let started = Instant::now();
    let recent = h.service.get_recent().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(ids(&recent), vec![a.id]);
    assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");

    // Fallback reads never populate, and the other holder keeps its lock.
    assert_eq!(FaultyCache::count(&h.cache.populates), 0);
    assert!(h.cache.inner.is_locked(&key));
}

#[tokio::test]
async fn test_lock_error_reads_store_directly() {
    let h = Harness::new();
    let a = h.create("a@example.com", None).await;
    let b = h.create("b@example.com", None).await;
    h.wait_for_clears(2).await;

    h.cache.fail_locks.store(true, Ordering::SeqCst);

    let recent = assert_ok!(h.service.get_recent().await);
    assert_eq!(ids(&recent), vec![b.id, a.id]);
    assert_eq!(FaultyCache::count(&h.cache.populates), 0);
}

#[tokio::test]
async fn test_populate_failure_still_returns_rows_and_releases_lock() {
    let h = Harness::new();
    let a = h.create("a@example.com", None).await;
    h.wait_for_clears(1).await;

    h.cache.fail_writes.store(true, Ordering::SeqCst);

    let recent = assert_ok!(h.service.get_recent().await);
    assert_eq!(ids(&recent), vec![a.id]);

    let key = h.cache.lock_key_for(RECENT_LOCK_OPERATION);
    assert!(!h.cache.inner.is_locked(&key));
}

#[tokio::test]
async fn test_list_cached_while_acquiring_lock_skips_rebuild() {
    let h = Harness::new();
    let a = h.create("a@example.com", None).await;
    let b = h.create("b@example.com", None).await;
    h.wait_for_clears(2).await;

    // Another reader finishes a rebuild between our first look and our acquire.
    let cached = h.store.find_top_n_by_recency(RECENT_LIST_LIMIT).unwrap();
    h.cache.inner.populate_recent_list(&cached).await.unwrap();
    h.cache.reset_counters();
    h.cache.stale_recent_reads.store(1, Ordering::SeqCst);

    // With the rows gone, a store read would come back empty.
    h.delete_row(a.id);
    h.delete_row(b.id);

    let recent = assert_ok!(h.service.get_recent().await);
    assert_eq!(recent, cached);
    assert_eq!(FaultyCache::count(&h.cache.recent_reads), 2);
    assert_eq!(FaultyCache::count(&h.cache.populates), 0);

    let key = h.cache.lock_key_for(RECENT_LOCK_OPERATION);
    assert!(!h.cache.inner.is_locked(&key));
}

#[tokio::test]
async fn test_store_failure_during_rebuild_releases_lock() {
    let h = Harness::new();
    h.create("a@example.com", None).await;
    h.wait_for_clears(1).await;

    rusqlite::Connection::open(&h.fixture.db_path)
        .unwrap()
        .execute_batch("DROP TABLE notifications")
        .unwrap();

    let err = assert_err!(h.service.get_recent().await);
    assert!(matches!(err, ServiceError::Persistence(_)));
    assert_eq!(FaultyCache::count(&h.cache.populates), 0);

    let key = h.cache.lock_key_for(RECENT_LOCK_OPERATION);
    assert!(!h.cache.inner.is_locked(&key));
}
