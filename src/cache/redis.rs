// ABOUTME: Redis store client implementing the store capability traits
// ABOUTME: Handles connection retry with backoff, ready checks, key prefixing and command timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::store::{StoreClientFactory, StoreConnection};
use crate::config::StoreConfig;
use crate::errors::{AppError, AppResult};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo, RedisResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Run one Redis command under the configured response timeout
async fn run_command<T, F>(command: &str, limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = RedisResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Redis {} operation failed: {}", command, e);
            Err(AppError::store_command(command, e.to_string()).with_source(e))
        }
        Err(_) => {
            error!("Redis {} operation timed out after {:?}", command, limit);
            Err(AppError::store_command(
                command,
                format!("timed out after {}ms", limit.as_millis()),
            ))
        }
    }
}

/// Factory producing multiplexed Redis connections
pub struct RedisStoreFactory {
    client: redis::Client,
    config: StoreConfig,
}

impl RedisStoreFactory {
    /// Build the Redis client from store configuration without connecting
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL cannot be parsed
    pub fn new(config: &StoreConfig) -> AppResult<Self> {
        config.validate()?;

        let mut connection_info = config.url.as_str().into_connection_info().map_err(|e| {
            AppError::config_invalid(format!("Invalid Redis URL '{}': {e}", config.url))
        })?;
        connection_info.redis.db = config.db;
        if let Some(password) = &config.password {
            connection_info.redis.password = Some(password.clone());
        }

        let client = redis::Client::open(connection_info)
            .map_err(|e| AppError::config_invalid(format!("Failed to create Redis client: {e}")))?;

        info!(
            "Redis store configured (db={}, prefix={:?}, timeout={}s, response_timeout={}s, retries={}, offline_queue={})",
            config.db,
            config.key_prefix,
            config.connection_timeout_secs,
            config.response_timeout_secs,
            config.initial_connection_retries,
            config.enable_offline_queue
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Single connection attempt bounded by the connection timeout
    async fn connect_once(&self) -> AppResult<MultiplexedConnection> {
        match timeout(
            self.config.connection_timeout(),
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(
                AppError::store_unavailable(format!("Failed to connect to Redis: {e}"))
                    .with_source(e),
            ),
            Err(_) => Err(AppError::store_unavailable(format!(
                "Redis connection timed out after {}s",
                self.config.connection_timeout_secs
            ))),
        }
    }

    /// Connect with exponential backoff; a disabled offline queue means one attempt only
    async fn connect_with_retry(&self) -> AppResult<MultiplexedConnection> {
        let max_retries = if self.config.enable_offline_queue {
            self.config.initial_connection_retries
        } else {
            0
        };
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match self.connect_once().await {
                Ok(conn) => {
                    if attempt > 0 {
                        info!("Redis connection established after {} retries", attempt);
                    }
                    return Ok(conn);
                }
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                            attempt + 1,
                            max_retries + 1,
                            delay_ms,
                            e
                        );
                        sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(self.config.max_retry_delay_ms);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::store_unavailable(format!(
                "Failed to connect to Redis after {} attempts",
                max_retries + 1
            ))
        }))
    }
}

#[async_trait::async_trait]
impl StoreClientFactory for RedisStoreFactory {
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>> {
        let conn = self.connect_with_retry().await?;
        let mut connection = RedisConnection {
            conn: Some(conn),
            prefix: self.config.key_prefix.clone().unwrap_or_default(),
            response_timeout: self.config.response_timeout(),
        };

        if self.config.enable_ready_check {
            connection.ping().await.map_err(|e| {
                AppError::store_unavailable(format!("Redis ready check failed: {}", e.message))
            })?;
        }

        debug!("Opened Redis connection");
        Ok(Box::new(connection))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// One multiplexed Redis connection with key prefixing
pub struct RedisConnection {
    conn: Option<MultiplexedConnection>,
    prefix: String,
    response_timeout: Duration,
}

impl RedisConnection {
    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn connection(&mut self, command: &str) -> AppResult<&mut MultiplexedConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::store_command(command, "connection already closed"))
    }
}

#[async_trait::async_trait]
impl StoreConnection for RedisConnection {
    async fn get(&mut self, key: &str) -> AppResult<Option<String>> {
        let redis_key = self.prefixed(key);
        let limit = self.response_timeout;
        let conn = self.connection("GET")?;
        run_command("GET", limit, conn.get::<_, Option<String>>(&redis_key)).await
    }

    async fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let redis_key = self.prefixed(key);
        let limit = self.response_timeout;
        let conn = self.connection("SET")?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&redis_key).arg(value);
        // PX keeps sub-second overrides exact; SET with EX 0 would be rejected
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        run_command::<(), _>("SET", limit, cmd.query_async(conn)).await
    }

    async fn del(&mut self, keys: &[String]) -> AppResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let redis_keys: Vec<String> = keys.iter().map(|key| self.prefixed(key)).collect();
        let limit = self.response_timeout;
        let conn = self.connection("DEL")?;
        run_command("DEL", limit, conn.del::<_, u64>(&redis_keys)).await
    }

    async fn scan(
        &mut self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> AppResult<(u64, Vec<String>)> {
        let redis_pattern = self.prefixed(pattern);
        let limit = self.response_timeout;
        let prefix_len = self.prefix.len();
        let conn = self.connection("SCAN")?;

        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(&redis_pattern)
            .arg("COUNT")
            .arg(count);
        let (next_cursor, keys): (u64, Vec<String>) =
            run_command("SCAN", limit, cmd.query_async(conn)).await?;

        let keys = keys
            .into_iter()
            .map(|key| key.get(prefix_len..).map_or(key.clone(), ToOwned::to_owned))
            .collect();
        Ok((next_cursor, keys))
    }

    async fn ping(&mut self) -> AppResult<()> {
        let limit = self.response_timeout;
        let conn = self.connection("PING")?;
        let response: String =
            run_command("PING", limit, redis::cmd("PING").query_async(conn)).await?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(AppError::store_command(
                "PING",
                format!("unexpected PING response '{response}'"),
            ))
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        // Dropping the multiplexed handle tears down its driver task
        self.conn.take();
        Ok(())
    }
}
