// ABOUTME: Cache engine configuration types for the store, pool, health check and TTLs
// ABOUTME: Loads settings from environment variables and validates them before construction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::cache::CacheNamespace;
use crate::errors::{AppError, AppResult};
use crate::logging::LoggingConfig;
use market_cache_core::constants::{cache, redis};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Read an environment variable, falling back to `default` only when it is unset
///
/// A variable that is set but cannot be parsed is a configuration error rather
/// than a silent fallback.
fn env_or<T: FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::config_invalid(format!("{name} has unparseable value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// Top-level configuration handed to `CacheEngine::new`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEngineConfig {
    /// Backing store connection settings; required unless a store factory is injected
    #[serde(default)]
    pub store: Option<StoreConfig>,
    /// Connection pool bounds and eviction policy
    #[serde(default)]
    pub pool: PoolConfig,
    /// Scheduled health check settings
    #[serde(default)]
    pub health: HealthCheckConfig,
    /// Keys requested per SCAN iteration during namespace invalidation
    pub scan_batch_size: usize,
    /// Default expiration per namespace
    #[serde(default)]
    pub namespace_ttls: NamespaceTtlConfig,
    /// Installs a global tracing subscriber at construction when present
    #[serde(skip)]
    pub logging: Option<LoggingConfig>,
}

impl Default for CacheEngineConfig {
    fn default() -> Self {
        Self {
            store: None,
            pool: PoolConfig::default(),
            health: HealthCheckConfig::default(),
            scan_batch_size: cache::SCAN_BATCH_SIZE,
            namespace_ttls: NamespaceTtlConfig::default(),
            logging: None,
        }
    }
}

impl CacheEngineConfig {
    /// Load the full engine configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `REDIS_URL` is unset or any variable is unparseable
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            store: Some(StoreConfig::from_env()?),
            pool: PoolConfig::from_env()?,
            health: HealthCheckConfig::from_env()?,
            scan_batch_size: env_or("CACHE_SCAN_BATCH_SIZE", cache::SCAN_BATCH_SIZE)?,
            namespace_ttls: NamespaceTtlConfig::from_env()?,
            logging: Some(LoggingConfig::from_env()),
        })
    }

    /// Check settings that do not depend on which store backs the engine
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first inconsistent setting
    pub fn validate(&self) -> AppResult<()> {
        self.pool.validate()?;
        if self.scan_batch_size == 0 {
            return Err(AppError::config_invalid("scan_batch_size must be positive"));
        }
        if self.health.enabled && self.health.interval.is_zero() {
            return Err(AppError::config_invalid(
                "health check interval must be positive when enabled",
            ));
        }
        if let Some(store) = &self.store {
            store.validate()?;
        }
        Ok(())
    }

    /// Store configuration, failing fast when it is absent
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` when no store configuration was provided
    pub fn require_store(&self) -> AppResult<&StoreConfig> {
        self.store.as_ref().ok_or_else(|| {
            AppError::config_missing("backing store configuration (REDIS_URL) is required")
        })
    }
}

/// Redis connection, authentication and retry configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: String,
    /// Password sent with AUTH when set
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index
    #[serde(default)]
    pub db: i64,
    /// Prefix applied to every stored key ahead of the namespace
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Response/command timeout in seconds
    pub response_timeout_secs: u64,
    /// Retries when establishing a connection (ignored when the offline queue is disabled)
    pub initial_connection_retries: u32,
    /// Initial retry delay in milliseconds (doubles with exponential backoff)
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Send PING immediately after connecting before reporting the connection ready
    pub enable_ready_check: bool,
    /// Keep retrying connection establishment instead of failing on the first attempt
    pub enable_offline_queue: bool,
}

impl StoreConfig {
    /// Build a store configuration for `url` with default timeouts and retries
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
            db: redis::DEFAULT_DB,
            key_prefix: None,
            connection_timeout_secs: redis::CONNECTION_TIMEOUT_SECS,
            response_timeout_secs: redis::RESPONSE_TIMEOUT_SECS,
            initial_connection_retries: redis::INITIAL_CONNECTION_RETRIES,
            initial_retry_delay_ms: redis::INITIAL_RETRY_DELAY_MS,
            max_retry_delay_ms: redis::MAX_RETRY_DELAY_MS,
            enable_ready_check: true,
            enable_offline_queue: true,
        }
    }

    /// Load store configuration from environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` if `REDIS_URL` is unset, `ConfigInvalid` for unparseable values
    pub fn from_env() -> AppResult<Self> {
        let url = env::var("REDIS_URL")
            .map_err(|_| AppError::config_missing("REDIS_URL must be set for the cache engine"))?;
        Ok(Self {
            url,
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            db: env_or("REDIS_DB", redis::DEFAULT_DB)?,
            key_prefix: env::var("REDIS_KEY_PREFIX").ok().filter(|p| !p.is_empty()),
            connection_timeout_secs: env_or(
                "REDIS_CONNECTION_TIMEOUT_SECS",
                redis::CONNECTION_TIMEOUT_SECS,
            )?,
            response_timeout_secs: env_or(
                "REDIS_RESPONSE_TIMEOUT_SECS",
                redis::RESPONSE_TIMEOUT_SECS,
            )?,
            initial_connection_retries: env_or(
                "REDIS_INITIAL_CONNECTION_RETRIES",
                redis::INITIAL_CONNECTION_RETRIES,
            )?,
            initial_retry_delay_ms: env_or(
                "REDIS_INITIAL_RETRY_DELAY_MS",
                redis::INITIAL_RETRY_DELAY_MS,
            )?,
            max_retry_delay_ms: env_or("REDIS_MAX_RETRY_DELAY_MS", redis::MAX_RETRY_DELAY_MS)?,
            enable_ready_check: env_or("REDIS_ENABLE_READY_CHECK", true)?,
            enable_offline_queue: env_or("REDIS_ENABLE_OFFLINE_QUEUE", true)?,
        })
    }

    /// Reject settings that can never produce a working connection
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty URL, negative db or zero timeouts
    pub fn validate(&self) -> AppResult<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::config_missing("store url must not be empty"));
        }
        if self.db < 0 {
            return Err(AppError::config_invalid(format!(
                "store db index must be non-negative, got {}",
                self.db
            )));
        }
        if self.connection_timeout_secs == 0 || self.response_timeout_secs == 0 {
            return Err(AppError::config_invalid("store timeouts must be positive"));
        }
        Ok(())
    }

    /// Connection timeout as a `Duration`
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Response timeout as a `Duration`
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("key_prefix", &self.key_prefix)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("response_timeout_secs", &self.response_timeout_secs)
            .field("initial_connection_retries", &self.initial_connection_retries)
            .field("enable_ready_check", &self.enable_ready_check)
            .field("enable_offline_queue", &self.enable_offline_queue)
            .finish_non_exhaustive()
    }
}

/// Connection pool bounds and idle eviction policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Idle eviction never shrinks the pool below this many live connections
    pub min_size: usize,
    /// Upper bound on live connections and therefore on in-flight store requests
    pub max_size: usize,
    /// Idle connections older than this are evicted
    pub idle_timeout: Duration,
    /// Interval between eviction passes
    pub eviction_interval: Duration,
    /// PING each connection before lending it
    pub validate_on_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: cache::POOL_MIN_SIZE,
            max_size: cache::POOL_MAX_SIZE,
            idle_timeout: Duration::from_secs(cache::POOL_IDLE_TIMEOUT_SECS),
            eviction_interval: Duration::from_secs(cache::POOL_EVICTION_INTERVAL_SECS),
            validate_on_acquire: true,
        }
    }
}

impl PoolConfig {
    /// Load pool configuration from environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if a variable is set but unparseable
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            min_size: env_or("CACHE_POOL_MIN_SIZE", cache::POOL_MIN_SIZE)?,
            max_size: env_or("CACHE_POOL_MAX_SIZE", cache::POOL_MAX_SIZE)?,
            idle_timeout: Duration::from_secs(env_or(
                "CACHE_POOL_IDLE_TIMEOUT_SECS",
                cache::POOL_IDLE_TIMEOUT_SECS,
            )?),
            eviction_interval: Duration::from_secs(env_or(
                "CACHE_POOL_EVICTION_INTERVAL_SECS",
                cache::POOL_EVICTION_INTERVAL_SECS,
            )?),
            validate_on_acquire: env_or("CACHE_POOL_VALIDATE_ON_ACQUIRE", true)?,
        })
    }

    /// Check pool bounds
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` when `max_size` is zero, `min_size > max_size`
    /// or the eviction interval is zero
    pub fn validate(&self) -> AppResult<()> {
        if self.max_size == 0 {
            return Err(AppError::config_invalid("pool max_size must be positive"));
        }
        if self.min_size > self.max_size {
            return Err(AppError::config_invalid(format!(
                "pool min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.eviction_interval.is_zero() {
            return Err(AppError::config_invalid(
                "pool eviction_interval must be positive",
            ));
        }
        Ok(())
    }
}

/// Scheduled health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Run the check on a timer
    pub enabled: bool,
    /// Interval between checks
    pub interval: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(cache::HEALTH_CHECK_INTERVAL_SECS),
        }
    }
}

impl HealthCheckConfig {
    /// Load health check configuration from environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if a variable is set but unparseable
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            enabled: env_or("CACHE_HEALTH_CHECK_ENABLED", true)?,
            interval: Duration::from_secs(env_or(
                "CACHE_HEALTH_CHECK_INTERVAL_SECS",
                cache::HEALTH_CHECK_INTERVAL_SECS,
            )?),
        })
    }
}

/// Default expiration per namespace, in seconds; zero disables expiration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceTtlConfig {
    /// Quotes, prices and other market data
    pub market_data_secs: u64,
    /// Generated charts
    pub charts_secs: u64,
    /// Upstream API responses
    pub api_responses_secs: u64,
    /// Per-user preferences
    pub user_preferences_secs: u64,
    /// System configuration values
    pub system_config_secs: u64,
}

impl Default for NamespaceTtlConfig {
    fn default() -> Self {
        Self {
            market_data_secs: cache::TTL_MARKET_DATA_SECS,
            charts_secs: cache::TTL_CHARTS_SECS,
            api_responses_secs: cache::TTL_API_RESPONSES_SECS,
            user_preferences_secs: cache::TTL_USER_PREFERENCES_SECS,
            system_config_secs: cache::TTL_SYSTEM_CONFIG_SECS,
        }
    }
}

impl NamespaceTtlConfig {
    /// Load namespace TTLs from environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if a variable is set but unparseable
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            market_data_secs: env_or("CACHE_TTL_MARKET_DATA_SECS", cache::TTL_MARKET_DATA_SECS)?,
            charts_secs: env_or("CACHE_TTL_CHARTS_SECS", cache::TTL_CHARTS_SECS)?,
            api_responses_secs: env_or(
                "CACHE_TTL_API_RESPONSES_SECS",
                cache::TTL_API_RESPONSES_SECS,
            )?,
            user_preferences_secs: env_or(
                "CACHE_TTL_USER_PREFERENCES_SECS",
                cache::TTL_USER_PREFERENCES_SECS,
            )?,
            system_config_secs: env_or(
                "CACHE_TTL_SYSTEM_CONFIG_SECS",
                cache::TTL_SYSTEM_CONFIG_SECS,
            )?,
        })
    }

    /// Configured TTL in seconds for `namespace`
    #[must_use]
    pub const fn secs_for(&self, namespace: CacheNamespace) -> u64 {
        match namespace {
            CacheNamespace::MarketData => self.market_data_secs,
            CacheNamespace::Charts => self.charts_secs,
            CacheNamespace::ApiResponses => self.api_responses_secs,
            CacheNamespace::UserPreferences => self.user_preferences_secs,
            CacheNamespace::SystemConfig => self.system_config_secs,
        }
    }
}
