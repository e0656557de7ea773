// ABOUTME: Integration tests for store health probing through the engine
// ABOUTME: Covers on-demand checks, unreachable stores and the scheduled check task
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use anyhow::Result;
use market_cache::cache::memory::{InMemoryStore, StoreCommand};
use market_cache::cache::CacheEngine;
use market_cache::config::{CacheEngineConfig, HealthCheckConfig, PoolConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn create_engine(store: &InMemoryStore, health: HealthCheckConfig) -> Result<CacheEngine> {
    let config = CacheEngineConfig {
        health,
        ..CacheEngineConfig::default()
    };
    Ok(CacheEngine::with_store(config, Arc::new(store.clone()))?)
}

fn disabled() -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: false,
        ..HealthCheckConfig::default()
    }
}

#[tokio::test]
async fn test_health_check_reports_healthy_store() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store, disabled())?;

    let result = engine.health_check().await;

    assert!(result.healthy);
    assert!(result.error.is_none());
    assert!(result.timestamp_ms > 0);
    assert_eq!(engine.last_health().await, Some(result));
    assert_eq!(engine.pool_status().active, 0);
    Ok(())
}

#[tokio::test]
async fn test_health_check_never_fails_on_unreachable_store() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store, disabled())?;
    store.set_reachable(false);

    let result = engine.health_check().await;

    assert!(!result.healthy);
    assert!(result.error.is_some());
    let metrics = engine.metrics();
    assert_eq!(metrics.unscoped_errors, 1);
    assert!(metrics.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_ping_discards_connection() -> Result<()> {
    let store = InMemoryStore::new();
    let config = CacheEngineConfig {
        health: disabled(),
        pool: PoolConfig {
            min_size: 0,
            max_size: 2,
            validate_on_acquire: false,
            ..PoolConfig::default()
        },
        ..CacheEngineConfig::default()
    };
    let engine = CacheEngine::with_store(config, Arc::new(store.clone()))?;
    assert!(engine.health_check().await.healthy);
    assert_eq!(engine.pool_status().idle, 1);

    store.inject_failure(StoreCommand::Ping, 0, 1).await;
    assert!(!engine.health_check().await.healthy);

    // Not returned to the idle set, so the next caller gets a fresh connection
    let status = engine.pool_status();
    assert_eq!((status.live, status.idle), (0, 0));
    assert!(engine.health_check().await.healthy);
    assert_eq!(store.stats().connections_opened, 2);
    Ok(())
}

#[tokio::test]
async fn test_scheduled_check_tracks_store_state() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(
        &store,
        HealthCheckConfig {
            enabled: true,
            interval: Duration::from_millis(20),
        },
    )?;

    sleep(Duration::from_millis(60)).await;
    assert!(engine.last_health().await.unwrap().healthy);

    store.set_reachable(false);
    sleep(Duration::from_millis(80)).await;
    assert!(!engine.last_health().await.unwrap().healthy);
    assert!(engine.metrics().unscoped_errors >= 1);

    store.set_reachable(true);
    sleep(Duration::from_millis(80)).await;
    assert!(engine.last_health().await.unwrap().healthy);

    engine.shutdown().await;
    let pings = store.stats().pings;
    sleep(Duration::from_millis(60)).await;
    assert_eq!(store.stats().pings, pings);
    Ok(())
}
