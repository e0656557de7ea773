// ABOUTME: Cache-aside engine facade: get/set/invalidate/namespace invalidation over a pooled store
// ABOUTME: Resolves canonical keys and TTLs, times every store round trip and feeds instrumentation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::codec;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::namespace::NamespacePolicy;
use super::pool::{ConnectionPool, PoolStatus, PooledConnection};
use super::redis::RedisStoreFactory;
use super::store::{StoreClientFactory, StoreConnection};
use super::{CacheKey, CacheNamespace, CacheOptions};
use crate::config::CacheEngineConfig;
use crate::errors::{AppError, AppResult};
use crate::health::{HealthCheckResult, HealthChecker};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Namespaced cache-aside engine
///
/// One instance owns its connection pool, metrics and health checker. Share it
/// between collaborators with `Arc<CacheEngine>`; there is no process-wide
/// singleton.
///
/// # Examples
///
/// ```rust,no_run
/// use market_cache::cache::memory::InMemoryStore;
/// use market_cache::cache::{CacheEngine, CacheNamespace, CacheOptions};
/// use market_cache::config::CacheEngineConfig;
/// use std::sync::Arc;
/// # async fn example() -> Result<(), market_cache::errors::AppError> {
///
/// let engine = CacheEngine::with_store(
///     CacheEngineConfig::default(),
///     Arc::new(InMemoryStore::new()),
/// )?;
///
/// engine
///     .set(CacheNamespace::MarketData, "AAPL-price", &150.25_f64, CacheOptions::default())
///     .await?;
/// let price: Option<f64> = engine.get(CacheNamespace::MarketData, "AAPL-price").await?;
/// assert_eq!(price, Some(150.25));
///
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct CacheEngine {
    pool: Arc<ConnectionPool>,
    metrics: Arc<CacheMetrics>,
    policy: NamespacePolicy,
    scan_batch_size: usize,
    health: HealthChecker,
}

impl CacheEngine {
    /// Create an engine backed by Redis
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` when no store configuration is present and
    /// `ConfigInvalid` for unusable settings
    pub fn new(config: CacheEngineConfig) -> AppResult<Self> {
        let factory = RedisStoreFactory::new(config.require_store()?)?;
        Self::with_store(config, Arc::new(factory))
    }

    /// Create an engine over any store implementation
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` for inconsistent pool, scan or health settings
    pub fn with_store(
        config: CacheEngineConfig,
        factory: Arc<dyn StoreClientFactory>,
    ) -> AppResult<Self> {
        config.validate()?;

        if let Some(logging) = &config.logging {
            if let Err(e) = logging.init() {
                debug!("Tracing subscriber already installed: {}", e);
            }
        }

        info!(
            backend = factory.backend_name(),
            scan_batch_size = config.scan_batch_size,
            health_check_enabled = config.health.enabled,
            "Initializing cache engine"
        );

        let pool = Arc::new(ConnectionPool::new(factory, config.pool.clone())?);
        let metrics = Arc::new(CacheMetrics::new());
        let health = HealthChecker::new(Arc::clone(&pool), Arc::clone(&metrics));
        if config.health.enabled {
            health.start(config.health.interval);
        }

        Ok(Self {
            pool,
            metrics,
            policy: NamespacePolicy::from_config(&config.namespace_ttls),
            scan_batch_size: config.scan_batch_size,
            health,
        })
    }

    /// Read a cached value
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty key (before any I/O), a store error
    /// if the read fails, or `SerializationError` if the stored payload cannot
    /// be decoded as `T`
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: CacheNamespace,
        key: &str,
    ) -> AppResult<Option<T>> {
        let cache_key = CacheKey::new(namespace, key)?;
        self.read(&cache_key, false).await
    }

    /// Read a cached value, computing and storing it on a miss
    ///
    /// The fallback's `Ok(None)` means "nothing to cache": the engine skips
    /// population and returns `None`. The fallback's error is returned
    /// unchanged and nothing is cached. Concurrent misses on the same key each
    /// run their own fallback.
    ///
    /// If the store is unreachable the miss is still recorded and the fallback
    /// still runs; a failed population write is logged and the computed value
    /// returned anyway.
    ///
    /// # Errors
    ///
    /// Returns the fallback's error, or an engine error converted into `E` for
    /// an empty key or an undecodable stored payload
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        fallback: F,
        options: CacheOptions,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        E: From<AppError> + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, E>> + Send,
    {
        let cache_key = CacheKey::new(namespace, key)?;
        if let Some(cached) = self.read(&cache_key, true).await? {
            return Ok(Some(cached));
        }

        let Some(computed) = fallback().await? else {
            debug!(key = %cache_key, "Fallback produced no value, skipping cache population");
            return Ok(None);
        };

        match self.write(&cache_key, &computed, &options).await {
            Ok(()) => {}
            Err(e) if e.is_connectivity() => {
                warn!(key = %cache_key, "Cache population failed, returning computed value: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Some(computed))
    }

    /// Store a value under `namespace:key`
    ///
    /// The TTL is `options.ttl` when given, else the namespace default; a zero
    /// TTL stores without expiration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty key, `SerializationError` if the
    /// value cannot be encoded (nothing is written), or a store error
    pub async fn set<T: Serialize + Sync + ?Sized>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        options: CacheOptions,
    ) -> AppResult<()> {
        let cache_key = CacheKey::new(namespace, key)?;
        self.write(&cache_key, value, &options).await
    }

    /// Delete one key
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty key or a store error
    pub async fn invalidate(&self, namespace: CacheNamespace, key: &str) -> AppResult<()> {
        let cache_key = CacheKey::new(namespace, key)?;
        let canonical = cache_key.canonical();
        let started = Instant::now();

        let mut conn = self.checkout(namespace, started).await?;
        if let Err(e) = conn.del(&[canonical]).await {
            return Err(self.command_failed(&mut conn, namespace, started, e));
        }
        drop(conn);

        self.metrics.record_delete(namespace, started.elapsed(), 1);
        debug!(key = %cache_key, "Invalidated cache entry");
        Ok(())
    }

    /// Delete every key in `namespace` using incremental SCAN + DEL
    ///
    /// One connection is held for the whole pass. Each scanned batch is deleted
    /// immediately, and a single delete event carrying the total is recorded
    /// when the cursor returns to zero.
    ///
    /// # Errors
    ///
    /// A failure mid-scan aborts the pass and is returned with the number of
    /// keys already deleted in its `details`
    pub async fn invalidate_namespace(&self, namespace: CacheNamespace) -> AppResult<u64> {
        let pattern = namespace.scan_pattern();
        let started = Instant::now();
        let mut conn = self.checkout(namespace, started).await?;

        let mut cursor = 0_u64;
        let mut deleted = 0_u64;
        let mut batches = 0_u64;
        loop {
            let (next_cursor, keys) = match conn.scan(cursor, &pattern, self.scan_batch_size).await
            {
                Ok(step) => step,
                Err(e) => {
                    return Err(self.abort_invalidation(&mut conn, namespace, started, deleted, e))
                }
            };

            if !keys.is_empty() {
                match conn.del(&keys).await {
                    Ok(removed) => deleted += removed,
                    Err(e) => {
                        return Err(
                            self.abort_invalidation(&mut conn, namespace, started, deleted, e)
                        )
                    }
                }
            }

            batches += 1;
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        drop(conn);

        let latency = started.elapsed();
        self.metrics.record_delete(namespace, latency, deleted);
        info!(
            namespace = %namespace,
            deleted,
            batches,
            latency_ms = latency.as_millis() as u64,
            "Invalidated cache namespace"
        );
        Ok(deleted)
    }

    /// Check store liveness through the pool; never fails
    pub async fn health_check(&self) -> HealthCheckResult {
        self.health.check().await
    }

    /// Result of the most recent scheduled or on-demand check
    pub async fn last_health(&self) -> Option<HealthCheckResult> {
        self.health.last_result().await
    }

    /// Per-namespace counters
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Connection pool occupancy
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Stop the health timer, drain the pool and close every connection
    ///
    /// The engine is not usable afterwards.
    pub async fn shutdown(&self) {
        self.health.stop().await;
        self.pool.shutdown().await;
        info!("Cache engine shut down");
    }

    async fn read<T: DeserializeOwned>(
        &self,
        cache_key: &CacheKey,
        degrade_on_store_error: bool,
    ) -> AppResult<Option<T>> {
        let namespace = cache_key.namespace();
        let canonical = cache_key.canonical();
        let started = Instant::now();

        let fetched = match self.checkout(namespace, started).await {
            Ok(mut conn) => match conn.get(&canonical).await {
                Ok(payload) => Ok(payload),
                Err(e) => Err(self.command_failed(&mut conn, namespace, started, e)),
            },
            Err(e) => Err(e),
        };

        let payload = match fetched {
            Ok(payload) => payload,
            Err(e) if degrade_on_store_error && e.is_connectivity() => {
                warn!(key = %cache_key, "Cache read failed, treating as miss: {}", e);
                self.metrics.record_miss(namespace, started.elapsed());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(payload) = payload else {
            self.metrics.record_miss(namespace, started.elapsed());
            debug!(key = %cache_key, "Cache miss");
            return Ok(None);
        };

        match codec::decode(&payload) {
            Ok(value) => {
                self.metrics.record_hit(namespace, started.elapsed());
                debug!(key = %cache_key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                error!(key = %cache_key, "Cached payload could not be decoded: {}", e);
                self.metrics
                    .increment_error(Some(namespace), Some(started.elapsed()));
                Err(e)
            }
        }
    }

    async fn write<T: Serialize + Sync + ?Sized>(
        &self,
        cache_key: &CacheKey,
        value: &T,
        options: &CacheOptions,
    ) -> AppResult<()> {
        let namespace = cache_key.namespace();
        let payload = codec::encode(value)?;
        let ttl = self.policy.resolve_ttl(namespace, options);
        let canonical = cache_key.canonical();
        let started = Instant::now();

        let mut conn = self.checkout(namespace, started).await?;
        if let Err(e) = conn.set(&canonical, &payload, ttl).await {
            return Err(self.command_failed(&mut conn, namespace, started, e));
        }
        drop(conn);

        self.metrics.record_set(namespace, started.elapsed());
        debug!(key = %cache_key, ttl = ?ttl, "Cache set");
        Ok(())
    }

    async fn checkout(
        &self,
        namespace: CacheNamespace,
        started: Instant,
    ) -> AppResult<PooledConnection> {
        self.pool.acquire().await.inspect_err(|_| {
            self.metrics
                .increment_error(Some(namespace), Some(started.elapsed()));
        })
    }

    fn command_failed(
        &self,
        conn: &mut PooledConnection,
        namespace: CacheNamespace,
        started: Instant,
        error: AppError,
    ) -> AppError {
        conn.mark_invalid();
        self.metrics
            .increment_error(Some(namespace), Some(started.elapsed()));
        error
    }

    fn abort_invalidation(
        &self,
        conn: &mut PooledConnection,
        namespace: CacheNamespace,
        started: Instant,
        deleted: u64,
        error: AppError,
    ) -> AppError {
        error!(
            namespace = %namespace,
            deleted,
            "Namespace invalidation aborted: {}", error
        );
        self.command_failed(conn, namespace, started, error)
            .with_details(json!({
                "namespace": namespace.as_str(),
                "deleted": deleted,
            }))
    }
}
