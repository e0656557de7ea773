// ABOUTME: Bounded pool of validated store connections with idle eviction
// ABOUTME: Lends connections through an RAII guard so every exit path returns them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::store::{StoreClientFactory, StoreConnection};
use crate::config::PoolConfig;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Sitting in the pool, available to lend
    Idle,
    /// Lent to a caller
    Active,
    /// Failed validation or a command; destroyed instead of returned
    Invalid,
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Connections currently open (idle + active)
    pub live: usize,
    /// Connections available to lend
    pub idle: usize,
    /// Connections lent out
    pub active: usize,
    /// Configured lower bound for eviction
    pub min: usize,
    /// Configured upper bound
    pub max: usize,
}

struct IdleConnection {
    id: Uuid,
    conn: Box<dyn StoreConnection>,
    idle_since: Instant,
}

/// A connection already counted in `live` but not yet lent
///
/// If the acquiring future is dropped while validation is in flight, the
/// guard uncounts the connection and closes it in the background.
struct PendingConnection {
    pool: Arc<PoolInner>,
    id: Uuid,
    conn: Option<Box<dyn StoreConnection>>,
}

impl PendingConnection {
    fn new(pool: &Arc<PoolInner>, id: Uuid, conn: Box<dyn StoreConnection>) -> Self {
        Self {
            pool: Arc::clone(pool),
            id,
            conn: Some(conn),
        }
    }

    async fn ping(&mut self) -> AppResult<()> {
        match self.conn.as_deref_mut() {
            Some(conn) => conn.ping().await,
            None => Err(AppError::store_command("PING", "connection already released")),
        }
    }

    /// Hand the connection over without uncounting it
    fn disarm(mut self) -> Option<Box<dyn StoreConnection>> {
        self.conn.take()
    }

    async fn destroy(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.destroy(self.id, conn).await;
        }
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(connection_id = %self.id, "Acquire cancelled during validation");
            self.pool.discard(self.id, conn);
        }
    }
}

struct PoolInner {
    factory: Arc<dyn StoreClientFactory>,
    config: PoolConfig,
    // Released connections are pushed to the back; acquire pops the back, eviction the front
    idle: Mutex<VecDeque<IdleConnection>>,
    permits: Arc<Semaphore>,
    live: AtomicUsize,
    closed: AtomicBool,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `live` drops before the close is awaited
    async fn destroy(&self, id: Uuid, mut conn: Box<dyn StoreConnection>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = conn.close().await {
            debug!(connection_id = %id, "Error closing store connection: {}", e);
        }
    }

    /// Uncount and close in the background; must not block or await
    fn discard(&self, id: Uuid, mut conn: Box<dyn StoreConnection>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    debug!(connection_id = %id, "Error closing discarded connection: {}", e);
                }
            });
        }
    }

    /// Open a connection; the caller's permit guarantees `live` stays within `max`
    async fn create(self: &Arc<Self>) -> AppResult<PendingConnection> {
        let conn = match self.factory.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(
                    backend = self.factory.backend_name(),
                    "Failed to open store connection: {}", e
                );
                return Err(e);
            }
        };

        // Counted only once open, and from here on the guard owns the count
        self.live.fetch_add(1, Ordering::SeqCst);
        let id = Uuid::new_v4();
        let mut pending = PendingConnection::new(self, id, conn);
        if self.config.validate_on_acquire {
            if let Err(e) = pending.ping().await {
                warn!(connection_id = %id, "New store connection failed validation: {}", e);
                pending.destroy().await;
                return Err(AppError::store_unavailable(format!(
                    "New connection failed validation: {}",
                    e.message
                ))
                .with_source(e));
            }
        }

        debug!(
            connection_id = %id,
            live = self.live.load(Ordering::SeqCst),
            "Opened store connection"
        );
        Ok(pending)
    }

    /// Called from the guard's drop; must not block or await
    fn give_back(&self, id: Uuid, conn: Box<dyn StoreConnection>, state: ConnectionState) {
        if state == ConnectionState::Invalid || self.closed.load(Ordering::SeqCst) {
            debug!(connection_id = %id, state = ?state, "Discarding store connection");
            self.discard(id, conn);
            return;
        }

        self.idle().push_back(IdleConnection {
            id,
            conn,
            idle_since: Instant::now(),
        });
    }

    /// Remove idle connections past the idle timeout, oldest first, keeping at least `min` live
    fn take_expired(&self) -> Vec<IdleConnection> {
        let now = Instant::now();
        let mut idle = self.idle();
        let mut expired = Vec::new();
        while let Some(oldest) = idle.front() {
            if now.duration_since(oldest.idle_since) < self.config.idle_timeout
                || self.live.load(Ordering::SeqCst) <= self.config.min_size
            {
                break;
            }
            if let Some(conn) = idle.pop_front() {
                self.live.fetch_sub(1, Ordering::SeqCst);
                expired.push(conn);
            }
        }
        expired
    }

    async fn evict_idle(&self) -> usize {
        let expired = self.take_expired();
        let count = expired.len();
        for mut idle in expired {
            if let Err(e) = idle.conn.close().await {
                debug!(connection_id = %idle.id, "Error closing evicted connection: {}", e);
            }
        }
        if count > 0 {
            debug!(
                evicted = count,
                live = self.live.load(Ordering::SeqCst),
                "Evicted idle store connections"
            );
        }
        count
    }
}

/// Bounded, validating connection pool over a [`StoreClientFactory`]
///
/// Connections are created lazily. At most `max_size` are ever open; callers
/// beyond that wait in FIFO order for a release. Every connection is PINGed
/// before it is lent (when `validate_on_acquire` is set) and replaced if the
/// check fails.
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    shutdown_tx: mpsc::Sender<()>,
    eviction_task: JoinHandle<()>,
}

impl ConnectionPool {
    /// Create the pool and start its background eviction task
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pool bounds are invalid
    pub fn new(factory: Arc<dyn StoreClientFactory>, config: PoolConfig) -> AppResult<Self> {
        config.validate()?;

        info!(
            backend = factory.backend_name(),
            min = config.min_size,
            max = config.max_size,
            idle_timeout_ms = config.idle_timeout.as_millis() as u64,
            "Initializing store connection pool"
        );

        let inner = Arc::new(PoolInner {
            factory,
            permits: Arc::new(Semaphore::new(config.max_size)),
            config,
            idle: Mutex::new(VecDeque::new()),
            live: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let eviction_task = Self::spawn_eviction_task(
            Arc::downgrade(&inner),
            inner.config.eviction_interval,
            shutdown_rx,
        );

        Ok(Self {
            inner,
            shutdown_tx,
            eviction_task,
        })
    }

    fn spawn_eviction_task(
        pool: Weak<PoolInner>,
        eviction_interval: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(eviction_interval);
            // The first tick completes immediately; nothing can be idle yet
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(inner) = pool.upgrade() else { break };
                        inner.evict_idle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Pool eviction task received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    /// Borrow a validated connection, waiting while `max_size` are lent out
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the pool is shut down or a new connection
    /// cannot be opened or validated
    pub async fn acquire(&self) -> AppResult<PooledConnection> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(AppError::store_unavailable("connection pool is shut down"));
        }

        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::store_unavailable("connection pool is shut down"))?;

        loop {
            let candidate = self.inner.idle().pop_back();
            let Some(idle) = candidate else {
                let pending = self.inner.create().await?;
                return Ok(self.lend(pending, permit));
            };

            let mut pending = PendingConnection::new(&self.inner, idle.id, idle.conn);
            if !self.inner.config.validate_on_acquire {
                return Ok(self.lend(pending, permit));
            }

            match pending.ping().await {
                Ok(()) => return Ok(self.lend(pending, permit)),
                Err(e) => {
                    warn!(
                        connection_id = %pending.id,
                        "Idle store connection failed validation, replacing: {}", e
                    );
                    pending.destroy().await;
                }
            }
        }
    }

    fn lend(&self, pending: PendingConnection, permit: OwnedSemaphorePermit) -> PooledConnection {
        let id = pending.id;
        PooledConnection {
            id,
            conn: pending.disarm(),
            state: ConnectionState::Active,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        }
    }

    /// Return a connection to the pool; equivalent to dropping the guard
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Run one eviction pass immediately, returning how many connections were closed
    pub async fn evict_idle(&self) -> usize {
        self.inner.evict_idle().await
    }

    /// Current occupancy
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle().len();
        let live = self.inner.live.load(Ordering::SeqCst);
        PoolStatus {
            live,
            idle,
            active: live.saturating_sub(idle),
            min: self.inner.config.min_size,
            max: self.inner.config.max_size,
        }
    }

    /// Whether `shutdown` has started
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop eviction, wait for lent connections to come back, then close everything
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.shutdown_tx.try_send(()) {
            debug!(error = ?e, "Pool eviction shutdown signal send failed");
        }

        let max = u32::try_from(self.inner.config.max_size).unwrap_or(u32::MAX);
        match self.inner.permits.acquire_many(max).await {
            Ok(drained) => drained.forget(),
            Err(e) => debug!("Pool semaphore already closed during drain: {}", e),
        }
        self.inner.permits.close();

        let remaining: Vec<IdleConnection> = self.inner.idle().drain(..).collect();
        let closed = remaining.len();
        for idle in remaining {
            self.inner.destroy(idle.id, idle.conn).await;
        }

        info!(
            closed,
            live = self.inner.live.load(Ordering::SeqCst),
            "Store connection pool shut down"
        );
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        // Errors are expected if the task already stopped
        if let Err(e) = self.shutdown_tx.try_send(()) {
            debug!(error = ?e, "Pool eviction shutdown signal send failed");
        }
    }
}

/// A connection lent by [`ConnectionPool::acquire`]
///
/// Implements [`StoreConnection`] by forwarding to the lent connection.
/// Dropping the guard returns the connection to the pool, or destroys it if
/// it was marked invalid.
pub struct PooledConnection {
    id: Uuid,
    // Always `Some` until dropped or closed
    conn: Option<Box<dyn StoreConnection>>,
    state: ConnectionState,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Identifier used in pool logs
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Destroy this connection on release instead of returning it to the idle set
    pub fn mark_invalid(&mut self) {
        self.state = ConnectionState::Invalid;
    }

    fn connection(&mut self, command: &str) -> AppResult<&mut (dyn StoreConnection + 'static)> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::store_command(command, "connection already closed"))
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl StoreConnection for PooledConnection {
    async fn get(&mut self, key: &str) -> AppResult<Option<String>> {
        self.connection("GET")?.get(key).await
    }

    async fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.connection("SET")?.set(key, value, ttl).await
    }

    async fn del(&mut self, keys: &[String]) -> AppResult<u64> {
        self.connection("DEL")?.del(keys).await
    }

    async fn scan(
        &mut self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> AppResult<(u64, Vec<String>)> {
        self.connection("SCAN")?.scan(cursor, pattern, count).await
    }

    async fn ping(&mut self) -> AppResult<()> {
        self.connection("PING")?.ping().await
    }

    /// Close the lent connection now; it is not returned to the pool
    async fn close(&mut self) -> AppResult<()> {
        self.state = ConnectionState::Invalid;
        match self.conn.take() {
            Some(conn) => {
                self.pool.destroy(self.id, conn).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // The idle push happens here, before the permit field is dropped, so a
        // waiter woken by the permit always finds the connection
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(self.id, conn, self.state);
        }
    }
}
