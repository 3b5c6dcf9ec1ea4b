//! Test utilities and service harness for Courier tests.
//!
//! Provides:
//! - Temporary SQLite fixtures
//! - A cache wrapper that counts calls and injects failures or stale reads
//! - A publisher that records events and can be made to fail or stall
//! - A fully wired orchestrator over all of the above

#![allow(dead_code)]

use async_trait::async_trait;
use courier::cache::{CacheError, CacheStore, MemoryCache};
use courier::events::{EventPublisher, PublishError};
use courier::fanout::{Fanout, FanoutConfig};
use courier::model::{MessageType, NewNotification, Notification, NotificationEvent, NotificationType};
use courier::service::{NotificationService, ServiceSettings};
use courier::storage::NotificationStore;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    pub fn open_store(&self) -> NotificationStore {
        NotificationStore::open(&self.db_path, 8, Duration::from_secs(5)).expect("failed to open store")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a condition to become true with timeout.
///
/// Returns `true` if the condition was met, `false` if the timeout expired.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// [`MemoryCache`] wrapper that counts calls and can be told to fail.
///
/// Counters are bumped after the wrapped call completes.
#[derive(Default)]
pub struct FaultyCache {
    pub inner: MemoryCache,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_locks: AtomicBool,
    /// Number of upcoming recent-list reads that report an empty list.
    pub stale_recent_reads: AtomicUsize,
    pub recent_reads: AtomicUsize,
    pub puts: AtomicUsize,
    pub evictions: AtomicUsize,
    pub populates: AtomicUsize,
    pub clears: AtomicUsize,
}

impl FaultyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(flag: &AtomicBool) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        for counter in [
            &self.recent_reads,
            &self.puts,
            &self.evictions,
            &self.populates,
            &self.clears,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CacheStore for FaultyCache {
    async fn get_entity(&self, id: i64) -> Result<Option<Notification>, CacheError> {
        Self::check(&self.fail_reads)?;
        self.inner.get_entity(id).await
    }

    async fn put_entity(&self, notification: &Notification, ttl: Duration) -> Result<(), CacheError> {
        let result = match Self::check(&self.fail_writes) {
            Ok(()) => self.inner.put_entity(notification, ttl).await,
            Err(e) => Err(e),
        };
        self.puts.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn delete_entity(&self, id: i64) -> Result<(), CacheError> {
        let result = match Self::check(&self.fail_writes) {
            Ok(()) => self.inner.delete_entity(id).await,
            Err(e) => Err(e),
        };
        self.evictions.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn get_recent_list(&self) -> Result<Vec<Notification>, CacheError> {
        Self::check(&self.fail_reads)?;
        self.recent_reads.fetch_add(1, Ordering::SeqCst);
        let stale = self
            .stale_recent_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(Vec::new());
        }
        self.inner.get_recent_list().await
    }

    async fn populate_recent_list(&self, notifications: &[Notification]) -> Result<(), CacheError> {
        let result = match Self::check(&self.fail_writes) {
            Ok(()) => self.inner.populate_recent_list(notifications).await,
            Err(e) => Err(e),
        };
        self.populates.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn clear_recent_list(&self) -> Result<(), CacheError> {
        let result = match Self::check(&self.fail_writes) {
            Ok(()) => self.inner.clear_recent_list().await,
            Err(e) => Err(e),
        };
        self.clears.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn try_acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, CacheError> {
        Self::check(&self.fail_locks)?;
        self.inner.try_acquire_lock(key, token, ttl).await
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        Self::check(&self.fail_locks)?;
        self.inner.release_lock(key, token).await
    }

    fn lock_key_for(&self, operation: &str) -> String {
        self.inner.lock_key_for(operation)
    }
}

/// Publisher that records every event it accepts.
///
/// With `hang` set, `publish` stalls like an unreachable broker.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<NotificationEvent>>,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

impl RecordingPublisher {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn message_types(&self) -> Vec<MessageType> {
        self.events
            .lock()
            .iter()
            .map(|e| e.notification_message_type)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("injected failure".into()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Orchestrator wired to a temp store, [`FaultyCache`] and [`RecordingPublisher`].
pub struct Harness {
    pub fixture: TestFixture,
    pub store: NotificationStore,
    pub cache: Arc<FaultyCache>,
    pub publisher: Arc<RecordingPublisher>,
    pub fanout: Fanout,
    pub service: NotificationService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ServiceSettings::default())
    }

    /// Must be called from within a Tokio runtime.
    pub fn with_settings(settings: ServiceSettings) -> Self {
        Self::with_config(settings, FanoutConfig::default())
    }

    /// Must be called from within a Tokio runtime.
    pub fn with_config(settings: ServiceSettings, fanout_config: FanoutConfig) -> Self {
        courier::observability::tracing::init_test_tracing();

        let fixture = TestFixture::new();
        let store = fixture.open_store();
        let cache = Arc::new(FaultyCache::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let fanout = Fanout::spawn(fanout_config);

        let service = NotificationService::new(
            store.clone(),
            cache.clone(),
            publisher.clone(),
            fanout.handle(),
            settings,
        );

        Self {
            fixture,
            store,
            cache,
            publisher,
            fanout,
            service,
        }
    }

    /// Create a notification through the orchestrator.
    pub async fn create(&self, recipient: &str, subject: Option<&str>) -> Notification {
        let new = NewNotification {
            kind: NotificationType::Email,
            recipient: recipient.into(),
            subject: subject.map(str::to_string),
            content: format!("content for {recipient}"),
        };
        self.service.create(new).await.expect("create failed")
    }

    /// Delete a row behind the orchestrator's back.
    pub fn delete_row(&self, id: i64) {
        let mut tx = self.store.begin().expect("begin failed");
        tx.delete_by_id(id).expect("delete failed");
        tx.commit().expect("commit failed");
    }

    /// Wait until `n` recent-list clears have happened, i.e. every write's
    /// cache job so far has finished. Events are published separately.
    pub async fn wait_for_clears(&self, n: usize) {
        let cache = self.cache.clone();
        assert!(
            wait_for(Duration::from_secs(5), || FaultyCache::count(&cache.clears) >= n).await,
            "background jobs did not finish"
        );
    }

    /// Wait until `n` snapshot evictions have happened.
    pub async fn wait_for_evictions(&self, n: usize) {
        let cache = self.cache.clone();
        assert!(
            wait_for(Duration::from_secs(5), || FaultyCache::count(&cache.evictions) >= n).await,
            "evictions did not happen"
        );
    }

    /// Wait until `n` events have been published.
    pub async fn wait_for_events(&self, n: usize) {
        let publisher = self.publisher.clone();
        assert!(
            wait_for(Duration::from_secs(5), || publisher.len() >= n).await,
            "events were not published"
        );
    }
}
