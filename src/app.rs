//! Component wiring and lifecycle.
//!
//! [`App::build`] opens the store, picks the cache backend, starts the event
//! bus with its logging consumer and the fan-out queue, and hands them to the
//! orchestrator. [`App::shutdown`] tears them down in dependency order.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cache::{CacheError, CacheStore, MemoryCache};
use crate::config::{CacheBackend, Config};
use crate::events::{spawn_consumer, EventBus};
use crate::fanout::Fanout;
use crate::service::NotificationService;
use crate::storage::{NotificationStore, StoreError};

/// How long shutdown waits for the event consumer to drain.
const CONSUMER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for application startup.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to create data directory: {0}")]
    DataDir(#[from] std::io::Error),

    #[error("Failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to connect cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Redis cache backend requested but courier was built without the `redis-cache` feature")]
    RedisUnsupported,
}

/// A running set of components.
pub struct App {
    service: NotificationService,
    bus: EventBus,
    fanout: Fanout,
    consumer: JoinHandle<u64>,
}

impl App {
    /// Build all components from configuration.
    pub async fn build(config: &Config) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.db_path();
        let store = NotificationStore::open(&db_path, config.pool_size, config.busy_timeout())?;
        tracing::debug!(
            path = %db_path.display(),
            connections = store.state().connections,
            "Store ready"
        );

        let cache = connect_cache(config).await?;
        Ok(Self::with_cache(config, store, cache))
    }

    /// Build around an already opened store and cache.
    pub fn with_cache(config: &Config, store: NotificationStore, cache: Arc<dyn CacheStore>) -> Self {
        let bus = EventBus::new(config.event_channel_size);
        let consumer = spawn_consumer(bus.subscribe());
        let fanout = Fanout::spawn(config.fanout_config());

        let service = NotificationService::new(
            store,
            cache,
            Arc::new(bus.clone()),
            fanout.handle(),
            config.service_settings(),
        );

        Self {
            service,
            bus,
            fanout,
            consumer,
        }
    }

    pub fn service(&self) -> &NotificationService {
        &self.service
    }

    /// Drain background work, close the bus and wait for the consumer.
    ///
    /// Returns the number of events the consumer handled, if it stopped in time.
    pub async fn shutdown(self) -> Option<u64> {
        let Self {
            service,
            bus,
            fanout,
            consumer,
        } = self;

        if !fanout.shutdown().await {
            tracing::warn!("Some background jobs were still running at shutdown");
        }

        // The consumer stops once the last bus sender is gone.
        drop(service);
        drop(bus);

        match tokio::time::timeout(CONSUMER_SHUTDOWN_TIMEOUT, consumer).await {
            Ok(Ok(handled)) => {
                tracing::debug!(handled, "Event consumer finished");
                Some(handled)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Event consumer failed");
                None
            }
            Err(_) => {
                tracing::warn!("Event consumer did not stop in time");
                None
            }
        }
    }
}

async fn connect_cache(config: &Config) -> Result<Arc<dyn CacheStore>, AppError> {
    match config.cache_backend {
        CacheBackend::Memory => {
            tracing::debug!("Using in-process cache");
            Ok(Arc::new(MemoryCache::new(config.cache_keys())))
        }
        #[cfg(feature = "redis-cache")]
        CacheBackend::Redis => {
            let cache =
                crate::cache::RedisCache::connect(&config.redis_url, config.cache_keys()).await?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis-cache"))]
        CacheBackend::Redis => Err(AppError::RedisUnsupported),
    }
}
