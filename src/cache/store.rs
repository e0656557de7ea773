// ABOUTME: Store capability traits implemented by every cache backend
// ABOUTME: The engine and pool only ever talk to the backing store through these traits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::errors::AppResult;
use std::time::Duration;

/// One connection to a Redis-compatible key-value store
///
/// Keys passed in and returned from [`scan`](Self::scan) are in canonical
/// `"<namespace>:<key>"` form; any store-level prefix is applied and stripped
/// by the implementation.
#[async_trait::async_trait]
pub trait StoreConnection: Send {
    /// Read a value, `None` when the key does not exist
    async fn get(&mut self, key: &str) -> AppResult<Option<String>>;

    /// Write a value; `ttl` of `None` stores without expiration
    async fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// Delete keys, returning how many existed
    async fn del(&mut self, keys: &[String]) -> AppResult<u64>;

    /// One SCAN step: returns the next cursor (0 when finished) and matching keys
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize)
        -> AppResult<(u64, Vec<String>)>;

    /// Liveness check
    async fn ping(&mut self) -> AppResult<()>;

    /// Close the underlying connection
    async fn close(&mut self) -> AppResult<()>;
}

/// Creates store connections for the pool
#[async_trait::async_trait]
pub trait StoreClientFactory: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}
