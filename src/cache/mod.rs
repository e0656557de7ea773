// ABOUTME: Namespaced cache-aside engine over a pooled Redis-compatible store
// ABOUTME: Defines namespaces, canonical keys and per-call options shared by all cache modules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// JSON text codec for stored values
pub mod codec;
/// Cache-aside facade composing pool, codec, policy and metrics
pub mod engine;
/// In-memory store used as a test double and offline backend
pub mod memory;
/// Per-namespace counters and hit rate
pub mod metrics;
/// Namespace to default expiration table
pub mod namespace;
/// Bounded pool of validated store connections
pub mod pool;
/// Redis store client
pub mod redis;
/// Store capability traits implemented by every backend
pub mod store;

pub use engine::CacheEngine;
pub use metrics::{CacheMetrics, MetricsSnapshot, NamespaceStats};
pub use namespace::NamespacePolicy;
pub use pool::{ConnectionPool, ConnectionState, PoolStatus, PooledConnection};
pub use store::{StoreClientFactory, StoreConnection};

use crate::errors::{AppError, AppResult};
use market_cache_core::constants::cache::KEY_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Logical partition of cache keys sharing one default expiration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheNamespace {
    /// Quotes, prices and other market data
    MarketData,
    /// Generated charts
    Charts,
    /// Upstream API responses
    ApiResponses,
    /// Per-user preferences
    UserPreferences,
    /// System configuration values
    SystemConfig,
}

impl CacheNamespace {
    /// Every namespace, in declaration order
    pub const ALL: [Self; 5] = [
        Self::MarketData,
        Self::Charts,
        Self::ApiResponses,
        Self::UserPreferences,
        Self::SystemConfig,
    ];

    /// Wire name used as the key prefix
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "marketData",
            Self::Charts => "charts",
            Self::ApiResponses => "apiResponses",
            Self::UserPreferences => "userPreferences",
            Self::SystemConfig => "systemConfig",
        }
    }

    /// SCAN pattern matching every key in this namespace
    #[must_use]
    pub fn scan_pattern(&self) -> String {
        format!("{}{KEY_SEPARATOR}*", self.as_str())
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheNamespace {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AppError::invalid_input("cache namespace must not be empty"));
        }
        Self::ALL
            .into_iter()
            .find(|namespace| namespace.as_str() == s)
            .ok_or_else(|| AppError::invalid_input(format!("unknown cache namespace '{s}'")))
    }
}

/// Namespace plus caller key; renders as `"<namespace>:<key>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: CacheNamespace,
    key: String,
}

impl CacheKey {
    /// Create a key, rejecting an empty user key
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `key` is empty
    pub fn new(namespace: CacheNamespace, key: impl Into<String>) -> AppResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AppError::invalid_input(format!(
                "cache key in namespace '{namespace}' must not be empty"
            )));
        }
        Ok(Self { namespace, key })
    }

    /// Namespace component
    #[must_use]
    pub const fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    /// Caller-supplied key component
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Canonical wire form
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.namespace, self.key)
    }
}

/// Per-call overrides for `get_or_compute` and `set`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Overrides the namespace default; zero means no expiration
    pub ttl: Option<Duration>,
}

impl CacheOptions {
    /// Options carrying an explicit TTL override
    #[must_use]
    pub const fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}
