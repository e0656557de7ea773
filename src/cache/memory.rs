// ABOUTME: In-memory store implementing the store capability traits for tests and offline use
// ABOUTME: Emulates GET/SET/DEL/SCAN/PING with TTLs, key-ordered scan cursors and failure injection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::store::{StoreClientFactory, StoreConnection};
use crate::errors::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::time;

/// Commands that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCommand {
    /// GET
    Get,
    /// SET
    Set,
    /// DEL
    Del,
    /// SCAN
    Scan,
    /// PING
    Ping,
}

impl StoreCommand {
    const fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Del => "DEL",
            Self::Scan => "SCAN",
            Self::Ping => "PING",
        }
    }
}

/// Let `skip` calls through, then fail the next `times` calls
#[derive(Debug, Clone, Copy)]
struct FailureRule {
    skip: u64,
    times: u64,
}

/// Stored value with optional expiration
#[derive(Debug, Clone)]
struct StoredValue {
    data: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Counters describing traffic the store has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    /// Successful `connect()` calls
    pub connections_opened: u64,
    /// `close()` calls
    pub connections_closed: u64,
    /// Successful SET commands
    pub sets: u64,
    /// Successful DEL commands
    pub dels: u64,
    /// Successful SCAN commands
    pub scans: u64,
    /// Successful PING commands
    pub pings: u64,
}

#[derive(Default)]
struct StoreState {
    entries: RwLock<BTreeMap<String, StoredValue>>,
    scan_cursors: Mutex<HashMap<u64, String>>,
    failures: Mutex<HashMap<StoreCommand, FailureRule>>,
    delays: Mutex<HashMap<StoreCommand, Duration>>,
    next_cursor: AtomicU64,
    unreachable: AtomicBool,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    sets: AtomicU64,
    dels: AtomicU64,
    scans: AtomicU64,
    pings: AtomicU64,
}

/// Shared in-memory key space; every connection it hands out sees the same data
///
/// SCAN cursors remember the last key visited, so keys deleted mid-scan never
/// cause a surviving key to be skipped.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<StoreState>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: new connections and every command fail while unreachable
    pub fn set_reachable(&self, reachable: bool) {
        self.state.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Fail `times` calls of `command` after letting `skip` calls succeed
    pub async fn inject_failure(&self, command: StoreCommand, skip: u64, times: u64) {
        self.state
            .failures
            .lock()
            .await
            .insert(command, FailureRule { skip, times });
    }

    /// Make every call of `command` take at least `delay`; `Duration::ZERO` removes it
    pub async fn set_command_delay(&self, command: StoreCommand, delay: Duration) {
        let mut delays = self.state.delays.lock().await;
        if delay.is_zero() {
            delays.remove(&command);
        } else {
            delays.insert(command, delay);
        }
    }

    /// Remove every injected failure
    pub async fn clear_failures(&self) {
        self.state.failures.lock().await.clear();
    }

    /// Write a raw payload bypassing the codec
    pub async fn insert_raw(&self, key: impl Into<String>, payload: impl Into<String>) {
        self.state.entries.write().await.insert(
            key.into(),
            StoredValue {
                data: payload.into(),
                expires_at: None,
            },
        );
    }

    /// Raw payload for `key` if present and unexpired
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.state
            .entries
            .read()
            .await
            .get(key)
            .filter(|value| !value.is_expired())
            .map(|value| value.data.clone())
    }

    /// Number of unexpired keys
    pub async fn len(&self) -> usize {
        self.state
            .entries
            .read()
            .await
            .values()
            .filter(|value| !value.is_expired())
            .count()
    }

    /// Whether the store holds no unexpired keys
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Traffic counters
    #[must_use]
    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            connections_opened: self.state.connections_opened.load(Ordering::SeqCst),
            connections_closed: self.state.connections_closed.load(Ordering::SeqCst),
            sets: self.state.sets.load(Ordering::SeqCst),
            dels: self.state.dels.load(Ordering::SeqCst),
            scans: self.state.scans.load(Ordering::SeqCst),
            pings: self.state.pings.load(Ordering::SeqCst),
        }
    }

    /// Fail if unreachable or an injected rule fires for `command`
    async fn check(&self, command: StoreCommand) -> AppResult<()> {
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::store_command(command.name(), "store unreachable"));
        }

        let delay = self.state.delays.lock().await.get(&command).copied();
        if let Some(delay) = delay {
            time::sleep(delay).await;
        }

        let mut failures = self.state.failures.lock().await;
        if let Some(rule) = failures.get_mut(&command) {
            if rule.skip > 0 {
                rule.skip -= 1;
            } else if rule.times > 0 {
                rule.times -= 1;
                return Err(AppError::store_command(command.name(), "injected failure"));
            }
        }
        Ok(())
    }

    async fn scan_step(&self, cursor: u64, pattern: &str, count: usize) -> AppResult<(u64, Vec<String>)> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| {
            AppError::store_command("SCAN", format!("invalid pattern '{pattern}': {e}"))
        })?;

        let start = if cursor == 0 {
            None
        } else {
            let resumed = self.state.scan_cursors.lock().await.remove(&cursor);
            Some(resumed.ok_or_else(|| {
                AppError::store_command("SCAN", format!("unknown cursor {cursor}"))
            })?)
        };

        let entries = self.state.entries.read().await;
        let lower = start.as_ref().map_or(Bound::Unbounded, |key| Bound::Excluded(key.clone()));
        let mut examined = entries.range((lower, Bound::Unbounded));

        let mut keys = Vec::new();
        let mut last_examined = None;
        for (key, value) in examined.by_ref().take(count.max(1)) {
            if !value.is_expired() && matcher.matches(key) {
                keys.push(key.clone());
            }
            last_examined = Some(key.clone());
        }
        let finished = examined.next().is_none();
        drop(entries);

        let next = match (finished, last_examined) {
            (false, Some(last)) => {
                let id = self.state.next_cursor.fetch_add(1, Ordering::SeqCst) + 1;
                self.state.scan_cursors.lock().await.insert(id, last);
                id
            }
            _ => 0,
        };
        Ok((next, keys))
    }
}

#[async_trait::async_trait]
impl StoreClientFactory for InMemoryStore {
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>> {
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::store_unavailable(
                "Failed to connect to in-memory store: unreachable",
            ));
        }
        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryConnection {
            store: self.clone(),
            closed: false,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Connection handle into an [`InMemoryStore`]
pub struct InMemoryConnection {
    store: InMemoryStore,
    closed: bool,
}

impl InMemoryConnection {
    async fn check(&self, command: StoreCommand) -> AppResult<()> {
        if self.closed {
            return Err(AppError::store_command(command.name(), "connection already closed"));
        }
        self.store.check(command).await
    }
}

#[async_trait::async_trait]
impl StoreConnection for InMemoryConnection {
    async fn get(&mut self, key: &str) -> AppResult<Option<String>> {
        self.check(StoreCommand::Get).await?;
        let mut entries = self.store.state.entries.write().await;
        match entries.get(key) {
            Some(value) if value.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(value) => Ok(Some(value.data.clone())),
            None => Ok(None),
        }
    }

    async fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.check(StoreCommand::Set).await?;
        let stored = StoredValue {
            data: value.to_owned(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.store
            .state
            .entries
            .write()
            .await
            .insert(key.to_owned(), stored);
        self.store.state.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn del(&mut self, keys: &[String]) -> AppResult<u64> {
        self.check(StoreCommand::Del).await?;
        let mut entries = self.store.state.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|value| !value.is_expired())
            .count() as u64;
        drop(entries);
        self.store.state.dels.fetch_add(1, Ordering::SeqCst);
        Ok(removed)
    }

    async fn scan(
        &mut self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> AppResult<(u64, Vec<String>)> {
        self.check(StoreCommand::Scan).await?;
        let result = self.store.scan_step(cursor, pattern, count).await?;
        self.store.state.scans.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn ping(&mut self) -> AppResult<()> {
        self.check(StoreCommand::Ping).await?;
        self.store.state.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        if !self.closed {
            self.closed = true;
            self.store
                .state
                .connections_closed
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
