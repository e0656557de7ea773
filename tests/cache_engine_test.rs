// ABOUTME: Integration tests for the cache-aside engine over the in-memory store
// ABOUTME: Covers get/set, fallback population, namespace invalidation, metrics and degradation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use anyhow::Result;
use market_cache::cache::memory::{InMemoryStore, StoreCommand};
use market_cache::cache::{CacheEngine, CacheNamespace, CacheOptions};
use market_cache::config::{CacheEngineConfig, HealthCheckConfig, PoolConfig};
use market_cache::errors::{AppError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Quote {
    price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Payload {
    x: u32,
}

#[derive(Debug)]
enum SourceError {
    Upstream(String),
    Cache(AppError),
}

impl From<AppError> for SourceError {
    fn from(error: AppError) -> Self {
        Self::Cache(error)
    }
}

/// Helper: engine config with the scheduled health check disabled
fn test_config() -> CacheEngineConfig {
    CacheEngineConfig {
        pool: PoolConfig {
            min_size: 0,
            max_size: 4,
            ..PoolConfig::default()
        },
        health: HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        },
        ..CacheEngineConfig::default()
    }
}

fn create_engine(store: &InMemoryStore) -> Result<CacheEngine> {
    Ok(CacheEngine::with_store(test_config(), Arc::new(store.clone()))?)
}

#[tokio::test]
async fn test_set_then_get_round_trip() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    let quote = Quote { price: 150.25 };

    engine
        .set(CacheNamespace::MarketData, "AAPL-price", &quote, CacheOptions::default())
        .await?;
    let cached: Option<Quote> = engine.get(CacheNamespace::MarketData, "AAPL-price").await?;

    assert_eq!(cached, Some(quote));
    assert_eq!(
        store.raw("marketData:AAPL-price").await.as_deref(),
        Some(r#"{"price":150.25}"#)
    );

    let stats = *engine.metrics().get(CacheNamespace::MarketData).unwrap();
    assert_eq!(stats.sets, 1);
    assert_eq!(stats.hits, 1);
    assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
    Ok(())
}

#[tokio::test]
async fn test_get_without_fallback_on_miss_returns_none() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;

    let cached: Option<Quote> = engine.get(CacheNamespace::Charts, "missing").await?;

    assert_eq!(cached, None);
    let stats = *engine.metrics().get(CacheNamespace::Charts).unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.sets, 0);
    assert_eq!(store.stats().sets, 0);
    Ok(())
}

#[tokio::test]
async fn test_miss_runs_fallback_and_populates() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = Arc::clone(&calls);
        let value = engine
            .get_or_compute(
                CacheNamespace::ApiResponses,
                "profile",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, AppError>(Some(Payload { x: 7 }))
                },
                CacheOptions::default(),
            )
            .await?;
        assert_eq!(value, Some(Payload { x: 7 }));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.stats().sets, 1);
    let stats = *engine.metrics().get(CacheNamespace::ApiResponses).unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.sets, 1);
    Ok(())
}

#[tokio::test]
async fn test_fallback_none_is_not_cached() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;

    let value: Option<Payload> = engine
        .get_or_compute(
            CacheNamespace::UserPreferences,
            "user-1",
            || async { Ok::<_, AppError>(None) },
            CacheOptions::default(),
        )
        .await?;

    assert_eq!(value, None);
    assert!(store.is_empty().await);
    assert_eq!(store.stats().sets, 0);
    Ok(())
}

#[tokio::test]
async fn test_fallback_error_propagates_unchanged() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;

    let result: Result<Option<Payload>, SourceError> = engine
        .get_or_compute(
            CacheNamespace::ApiResponses,
            "quote-feed",
            || async { Err(SourceError::Upstream("feed down".to_owned())) },
            CacheOptions::default(),
        )
        .await;

    match result {
        Err(SourceError::Upstream(message)) => assert_eq!(message, "feed down"),
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert!(store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_empty_key_rejected_before_io() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;

    let error = engine
        .set(CacheNamespace::MarketData, "", &1_u32, CacheOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidInput);

    let error = engine.get::<u32>(CacheNamespace::MarketData, "").await.unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidInput);

    let result: Result<Option<u32>, SourceError> = engine
        .get_or_compute(
            CacheNamespace::MarketData,
            "",
            || async { Ok(Some(1)) },
            CacheOptions::default(),
        )
        .await;
    assert!(matches!(
        result,
        Err(SourceError::Cache(AppError {
            code: ErrorCode::InvalidInput,
            ..
        }))
    ));

    assert_eq!(store.stats().connections_opened, 0);
    assert!(engine.metrics().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_undecodable_payload_is_an_error() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    store.insert_raw("marketData:corrupt", "{not json").await;

    let error = engine
        .get::<Quote>(CacheNamespace::MarketData, "corrupt")
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::SerializationError);
    let stats = *engine.metrics().get(CacheNamespace::MarketData).unwrap();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.hits, 0);
    Ok(())
}

#[tokio::test]
async fn test_ttl_override_expires_entry() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;

    engine
        .set(
            CacheNamespace::SystemConfig,
            "flag",
            &true,
            CacheOptions::with_ttl(Duration::from_millis(50)),
        )
        .await?;
    assert_eq!(engine.get::<bool>(CacheNamespace::SystemConfig, "flag").await?, Some(true));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(engine.get::<bool>(CacheNamespace::SystemConfig, "flag").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_invalidate_removes_only_one_key() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    for key in ["a", "b"] {
        engine
            .set(CacheNamespace::Charts, key, &key, CacheOptions::default())
            .await?;
    }

    engine.invalidate(CacheNamespace::Charts, "a").await?;
    engine.invalidate(CacheNamespace::Charts, "never-set").await?;

    assert_eq!(engine.get::<String>(CacheNamespace::Charts, "a").await?, None);
    assert_eq!(
        engine.get::<String>(CacheNamespace::Charts, "b").await?,
        Some("b".to_owned())
    );
    assert_eq!(engine.metrics().get(CacheNamespace::Charts).unwrap().deletes, 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_misses_populate_once_stored() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    let calls = Arc::new(AtomicUsize::new(0));

    let (engine, calls) = (&engine, &calls);
    let fetch = move || {
        let counter = Arc::clone(calls);
        engine.get_or_compute(
            CacheNamespace::ApiResponses,
            "k",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(Some(Payload { x: 1 }))
            },
            CacheOptions::default(),
        )
    };
    let (first, second) = tokio::join!(fetch(), fetch());

    assert_eq!(first?, Some(Payload { x: 1 }));
    assert_eq!(second?, Some(Payload { x: 1 }));

    let invocations = calls.load(Ordering::SeqCst);
    assert!((1..=2).contains(&invocations));
    let misses = engine.metrics().get(CacheNamespace::ApiResponses).unwrap().misses;
    assert!((1..=2).contains(&misses));
    assert_eq!(
        engine.get::<Payload>(CacheNamespace::ApiResponses, "k").await?,
        Some(Payload { x: 1 })
    );
    Ok(())
}

#[tokio::test]
async fn test_invalidate_namespace_deletes_every_key_as_one_event() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    for i in 0..150 {
        engine
            .set(CacheNamespace::Charts, &format!("chart-{i}"), &i, CacheOptions::default())
            .await?;
    }

    let deleted = engine.invalidate_namespace(CacheNamespace::Charts).await?;

    assert_eq!(deleted, 150);
    assert!(store.is_empty().await);
    assert_eq!(engine.metrics().get(CacheNamespace::Charts).unwrap().deletes, 150);
    // 150 keys in batches of 100: two SCAN round trips
    assert_eq!(store.stats().scans, 2);
    Ok(())
}

#[tokio::test]
async fn test_invalidate_namespace_leaves_other_namespaces() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    engine
        .set(CacheNamespace::Charts, "shared", &1_u32, CacheOptions::default())
        .await?;
    engine
        .set(CacheNamespace::MarketData, "shared", &2_u32, CacheOptions::default())
        .await?;

    assert_eq!(engine.invalidate_namespace(CacheNamespace::Charts).await?, 1);

    assert_eq!(engine.get::<u32>(CacheNamespace::Charts, "shared").await?, None);
    assert_eq!(engine.get::<u32>(CacheNamespace::MarketData, "shared").await?, Some(2));
    Ok(())
}

#[tokio::test]
async fn test_invalidate_empty_namespace() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;

    assert_eq!(engine.invalidate_namespace(CacheNamespace::UserPreferences).await?, 0);
    assert_eq!(store.stats().dels, 0);
    Ok(())
}

#[tokio::test]
async fn test_invalidate_namespace_reports_progress_on_scan_failure() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    for i in 0..250 {
        engine
            .set(CacheNamespace::Charts, &format!("chart-{i:03}"), &i, CacheOptions::default())
            .await?;
    }
    store.inject_failure(StoreCommand::Scan, 1, 1).await;

    let error = engine
        .invalidate_namespace(CacheNamespace::Charts)
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::StoreCommandFailed);
    assert_eq!(error.details["deleted"], 100);
    assert_eq!(store.len().await, 150);
    let stats = *engine.metrics().get(CacheNamespace::Charts).unwrap();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.deletes, 0);
    Ok(())
}

#[tokio::test]
async fn test_store_outage_degrades_to_fallback() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    store.set_reachable(false);

    let value = engine
        .get_or_compute(
            CacheNamespace::MarketData,
            "MSFT-price",
            || async { Ok::<_, AppError>(Some(Quote { price: 410.5 })) },
            CacheOptions::default(),
        )
        .await?;
    assert_eq!(value, Some(Quote { price: 410.5 }));

    let stats = *engine.metrics().get(CacheNamespace::MarketData).unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.errors, 2);

    let error = engine
        .get::<Quote>(CacheNamespace::MarketData, "MSFT-price")
        .await
        .unwrap_err();
    assert!(error.is_connectivity());
    Ok(())
}

#[tokio::test]
async fn test_failed_command_does_not_leak_connections() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    store.inject_failure(StoreCommand::Get, 0, 1).await;

    assert!(engine.get::<u32>(CacheNamespace::Charts, "x").await.is_err());
    assert_eq!(engine.get::<u32>(CacheNamespace::Charts, "x").await?, None);

    let status = engine.pool_status();
    assert_eq!(status.active, 0);
    assert!(status.live <= status.max);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_pool() -> Result<()> {
    let store = InMemoryStore::new();
    let engine = create_engine(&store)?;
    engine
        .set(CacheNamespace::Charts, "c", &1_u32, CacheOptions::default())
        .await?;

    engine.shutdown().await;

    assert_eq!(engine.pool_status().live, 0);
    let error = engine.get::<u32>(CacheNamespace::Charts, "c").await.unwrap_err();
    assert!(error.is_connectivity());
    Ok(())
}

#[tokio::test]
async fn test_new_requires_store_config() {
    let error = CacheEngine::new(test_config()).err().unwrap();
    assert_eq!(error.code, ErrorCode::ConfigMissing);
}
