// ABOUTME: Redis connection constants for timeouts and connection retries
// ABOUTME: Consumed by the Redis store factory and its configuration loader
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Connection establishment timeout in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Per-command response timeout in seconds
pub const RESPONSE_TIMEOUT_SECS: u64 = 3;

/// Retries for establishing a connection before giving up
pub const INITIAL_CONNECTION_RETRIES: u32 = 3;

/// First retry delay in milliseconds (doubles on each attempt)
pub const INITIAL_RETRY_DELAY_MS: u64 = 100;

/// Upper bound on the retry delay in milliseconds
pub const MAX_RETRY_DELAY_MS: u64 = 2_000;

/// Logical database selected when none is configured
pub const DEFAULT_DB: i64 = 0;
