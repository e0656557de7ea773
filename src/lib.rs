// ABOUTME: Main library entry point for the market_cache engine
// ABOUTME: Namespaced cache-aside caching over a pooled Redis-compatible store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Market Cache
//!
//! A cache-aside engine for market data, charts, upstream API responses, user
//! preferences and system configuration. Values are JSON-encoded and stored
//! under `"<namespace>:<key>"` in a Redis-compatible store reached through a
//! bounded, validating connection pool.
//!
//! ## Features
//!
//! - **Namespaces**: each namespace carries its own default expiration
//! - **Cache-aside reads**: `get_or_compute` runs a fallback on a miss and stores its result
//! - **Namespace invalidation**: incremental SCAN + DEL that never blocks the store
//! - **Instrumentation**: per-namespace hit/miss/set/delete/error counters and hit rate
//! - **Health checks**: on-demand and scheduled PING checks through the pool
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use market_cache::cache::{CacheEngine, CacheNamespace, CacheOptions};
//! use market_cache::config::CacheEngineConfig;
//! use market_cache::errors::{AppError, AppResult};
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let engine = CacheEngine::new(CacheEngineConfig::from_env()?)?;
//!
//!     let quote: Option<f64> = engine
//!         .get_or_compute(
//!             CacheNamespace::MarketData,
//!             "AAPL-price",
//!             || async { Ok::<_, AppError>(Some(150.25)) },
//!             CacheOptions::default(),
//!         )
//!         .await?;
//!     println!("AAPL: {quote:?}");
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Cache engine, store backends, pool and metrics
pub mod cache;

/// Engine, store, pool and namespace configuration
pub mod config;

/// Store health probing
pub mod health;

/// Structured logging setup
pub mod logging;

/// Error types shared with the core crate
pub use market_cache_core::errors;

/// Cache defaults shared with the core crate
pub use market_cache_core::constants;
