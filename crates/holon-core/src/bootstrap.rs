//! Wiring a model from [`HolonConfig`].

use std::sync::Arc;

use holon_db::{
    CacheBackend, DragonflyCache, EventStore, MemoryCache, MemoryEventStore, PostgresConfig,
    PostgresPool, SqliteConfig, SqliteDatabase,
};

use crate::config::{CacheConfig, CacheKind, HolonConfig, StoreBackend, StoreConfig};
use crate::error::CoreError;
use crate::model::{OperatingModel, OperatingModelBuilder};

/// Open the configured event store and bring its schema up to date.
///
/// # Errors
///
/// Returns [`CoreError::Config`] for an unusable URL, or
/// [`CoreError::Storage`] if the database cannot be reached or migrated.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn EventStore>, CoreError> {
    let store: Arc<dyn EventStore> = match config.backend {
        StoreBackend::Sqlite => {
            let mut sqlite = SqliteConfig::file(&config.sqlite_path)
                .with_operation_timeout(config.operation_timeout());
            sqlite.max_connections = config.max_connections;
            let db = SqliteDatabase::connect(&sqlite).await?;
            db.run_migrations().await?;
            Arc::new(db.event_store())
        }
        StoreBackend::Postgres => {
            let postgres = PostgresConfig::new(&config.postgres_url)
                .with_max_connections(config.max_connections)
                .with_operation_timeout(config.operation_timeout());
            let pool = PostgresPool::connect(&postgres).await?;
            pool.run_migrations().await?;
            Arc::new(pool.event_store())
        }
        StoreBackend::Memory => {
            tracing::warn!("Using an in-memory event store; events are lost on exit");
            Arc::new(MemoryEventStore::new())
        }
    };
    tracing::info!(backend = config.backend.as_str(), "Event store open");
    Ok(store)
}

/// Open the configured cache, or `None` when caching is disabled.
///
/// # Errors
///
/// Returns [`CoreError::Config`] for an unusable URL, or
/// [`CoreError::Storage`] if `Dragonfly` cannot be reached.
pub async fn open_cache(config: &CacheConfig) -> Result<Option<Arc<dyn CacheBackend>>, CoreError> {
    if !config.enabled {
        return Ok(None);
    }
    let cache: Arc<dyn CacheBackend> = match config.backend {
        CacheKind::Dragonfly => {
            Arc::new(DragonflyCache::connect(&config.dragonfly_url, &config.namespace).await?)
        }
        CacheKind::Memory => Arc::new(MemoryCache::namespaced(&config.namespace)),
    };
    Ok(Some(cache))
}

/// Open every configured backend and return a builder ready to
/// [`build`](OperatingModelBuilder::build), for callers that add their own
/// settings first.
///
/// An unreachable cache is logged and skipped: the model runs uncached.
/// An unreachable event store is fatal.
///
/// # Errors
///
/// Returns the store's error.
pub async fn builder_from_config(config: &HolonConfig) -> Result<OperatingModelBuilder, CoreError> {
    let store = open_store(&config.store).await?;
    let mut builder = OperatingModel::builder(store)
        .availability(config.availability.clone())
        .queue_capacity(config.projection.queue_capacity);

    match open_cache(&config.cache).await {
        Ok(Some(cache)) => {
            builder = builder.cache(cache, &config.cache.namespace, config.cache.ttl());
        }
        Ok(None) => tracing::info!("Graph cache disabled"),
        Err(e) => {
            tracing::warn!(error = %e, "Graph cache unavailable, running uncached");
        }
    }
    Ok(builder)
}

impl OperatingModel {
    /// Open every configured backend and build a running model. See
    /// [`builder_from_config`].
    ///
    /// # Errors
    ///
    /// Returns the store's error, or the replay error from
    /// [`OperatingModelBuilder::build`].
    pub async fn from_config(config: &HolonConfig) -> Result<Self, CoreError> {
        builder_from_config(config).await?.build().await
    }
}
