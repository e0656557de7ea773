// ABOUTME: Cache-related constants for namespace TTLs, pool sizing and scanning
// ABOUTME: Defaults used by configuration loaders when a value is not provided
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Market data TTL (1 minute) - quotes go stale quickly
pub const TTL_MARKET_DATA_SECS: u64 = 60;

/// Chart TTL (5 minutes) - rendered charts are expensive but tolerate lag
pub const TTL_CHARTS_SECS: u64 = 300;

/// Upstream API response TTL (5 minutes)
pub const TTL_API_RESPONSES_SECS: u64 = 300;

/// User preference TTL (1 hour)
pub const TTL_USER_PREFERENCES_SECS: u64 = 3_600;

/// System configuration TTL (24 hours)
pub const TTL_SYSTEM_CONFIG_SECS: u64 = 86_400;

/// Connection pool minimum size
pub const POOL_MIN_SIZE: usize = 2;

/// Connection pool maximum size
pub const POOL_MAX_SIZE: usize = 10;

/// Idle connections older than this are eligible for eviction
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;

/// Interval between idle eviction passes
pub const POOL_EVICTION_INTERVAL_SECS: u64 = 10;

/// Keys requested per SCAN iteration during namespace invalidation
pub const SCAN_BATCH_SIZE: usize = 100;

/// Interval between scheduled health checks
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Latency samples retained per namespace
pub const LATENCY_SAMPLE_CAPACITY: usize = 1_000;

/// Separator between namespace and user key in the canonical key
pub const KEY_SEPARATOR: char = ':';
