// ABOUTME: Store liveness probing through the connection pool, on demand or on a schedule
// ABOUTME: Keeps the latest check result and logs healthy/unhealthy transitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Health checks for the cache store

use crate::cache::{CacheMetrics, ConnectionPool, StoreConnection};
use crate::errors::AppResult;
use chrono::Utc;
use market_cache_core::constants::service_names;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// Outcome of one liveness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    /// Whether a connection could be acquired and answered PING
    pub healthy: bool,
    /// Check round-trip time in milliseconds
    pub latency_ms: u64,
    /// Failure description when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix time of the check in milliseconds
    pub timestamp_ms: i64,
}

struct ScheduledCheck {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Checks the store via the pool and keeps the latest result
pub struct HealthChecker {
    pool: Arc<ConnectionPool>,
    metrics: Arc<CacheMetrics>,
    last_result: Arc<RwLock<Option<HealthCheckResult>>>,
    scheduled: Mutex<Option<ScheduledCheck>>,
}

impl HealthChecker {
    /// Create a checker; no check runs until `check` or `start` is called
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            pool,
            metrics,
            last_result: Arc::new(RwLock::new(None)),
            scheduled: Mutex::new(None),
        }
    }

    /// Run one check now; never fails
    ///
    /// A failed check increments the engine's unscoped error counter.
    pub async fn check(&self) -> HealthCheckResult {
        let result = Self::run_check(&self.pool, &self.metrics).await;
        *self.last_result.write().await = Some(result.clone());
        result
    }

    /// Most recent check result, if any check has run
    pub async fn last_result(&self) -> Option<HealthCheckResult> {
        self.last_result.read().await.clone()
    }

    /// Start probing every `interval`; a second call while running is ignored
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) {
        let mut scheduled = self.scheduled.lock().unwrap_or_else(PoisonError::into_inner);
        if scheduled.is_some() {
            debug!("Health check task already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let pool = Arc::clone(&self.pool);
        let metrics = Arc::clone(&self.metrics);
        let last_result = Arc::clone(&self.last_result);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = Self::run_check(&pool, &metrics).await;
                        let previous = last_result.write().await.replace(result.clone());
                        Self::log_transition(previous.as_ref(), &result);
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Health check task received shutdown signal");
                        break;
                    }
                }
            }
        });

        info!(
            service = service_names::MARKET_CACHE,
            interval_secs = interval.as_secs(),
            "Started scheduled store health checks"
        );
        *scheduled = Some(ScheduledCheck {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the scheduled check and wait for its task to finish
    pub async fn stop(&self) {
        let scheduled = self
            .scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(scheduled) = scheduled else {
            return;
        };

        if let Err(e) = scheduled.shutdown_tx.send(()).await {
            debug!(error = ?e, "Health check task already stopped");
        }
        if let Err(e) = scheduled.handle.await {
            warn!("Health check task ended abnormally: {}", e);
        }
    }

    async fn run_check(pool: &ConnectionPool, metrics: &CacheMetrics) -> HealthCheckResult {
        let started = Instant::now();
        let outcome: AppResult<()> = async {
            let mut conn = pool.acquire().await?;
            let pinged = conn.ping().await;
            if pinged.is_err() {
                conn.mark_invalid();
            }
            pinged
        }
        .await;
        let elapsed = started.elapsed();
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(()) => HealthCheckResult {
                healthy: true,
                latency_ms,
                error: None,
                timestamp_ms: Utc::now().timestamp_millis(),
            },
            Err(e) => {
                metrics.increment_error(None, Some(elapsed));
                HealthCheckResult {
                    healthy: false,
                    latency_ms,
                    error: Some(e.to_string()),
                    timestamp_ms: Utc::now().timestamp_millis(),
                }
            }
        }
    }

    fn log_transition(previous: Option<&HealthCheckResult>, current: &HealthCheckResult) {
        let was_healthy = previous.map(|result| result.healthy);
        match (was_healthy, current.healthy) {
            (Some(false) | None, true) => {
                info!(latency_ms = current.latency_ms, "Cache store is healthy");
            }
            (Some(true) | None, false) => {
                warn!(
                    latency_ms = current.latency_ms,
                    error = current.error.as_deref().unwrap_or("unknown"),
                    "Cache store is unhealthy"
                );
            }
            _ => debug!(
                healthy = current.healthy,
                latency_ms = current.latency_ms,
                "Scheduled health check completed"
            ),
        }
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        let scheduled = self
            .scheduled
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduled) = scheduled {
            if let Err(e) = scheduled.shutdown_tx.try_send(()) {
                debug!(error = ?e, "Health check shutdown signal send failed");
            }
        }
    }
}
