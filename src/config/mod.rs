// ABOUTME: Configuration module for the cache engine
// ABOUTME: Exposes engine, store, pool, health-check and namespace TTL settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration for the cache engine
//!
//! Every setting is an explicit field on [`cache::CacheEngineConfig`]. The
//! `from_env` loaders fill unset variables from the documented constants and
//! reject values that are present but unparseable.

/// Engine, store, pool and TTL configuration
pub mod cache;

pub use cache::{
    CacheEngineConfig, HealthCheckConfig, NamespaceTtlConfig, PoolConfig, StoreConfig,
};
