// ABOUTME: Per-namespace cache instrumentation with hit/miss/set/delete/error counters
// ABOUTME: Hit rate is recomputed under the namespace entry lock so snapshots stay consistent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::CacheNamespace;
use dashmap::DashMap;
use market_cache_core::constants::cache::LATENCY_SAMPLE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Mutable counters for one namespace
#[derive(Debug, Default)]
struct NamespaceRecord {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    errors: u64,
    hit_rate: f64,
    latencies_ms: VecDeque<f64>,
}

impl NamespaceRecord {
    fn push_latency(&mut self, latency: Duration) {
        if self.latencies_ms.len() == LATENCY_SAMPLE_CAPACITY {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(latency.as_secs_f64() * 1_000.0);
    }

    fn recompute_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
    }

    fn stats(&self) -> NamespaceStats {
        NamespaceStats {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            deletes: self.deletes,
            errors: self.errors,
            hit_rate: self.hit_rate,
        }
    }
}

/// Immutable counters for one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    /// Reads that found a value
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// Successful writes
    pub sets: u64,
    /// Keys deleted
    pub deletes: u64,
    /// Failed operations
    pub errors: u64,
    /// `hits / (hits + misses)`, zero before any read
    pub hit_rate: f64,
}

/// Point-in-time view of every namespace that has seen traffic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Per-namespace counters
    pub namespaces: BTreeMap<CacheNamespace, NamespaceStats>,
    /// Errors not attributable to a namespace (health checks)
    pub unscoped_errors: u64,
}

impl MetricsSnapshot {
    /// Counters for `namespace`, `None` if it has seen no events
    #[must_use]
    pub fn get(&self, namespace: CacheNamespace) -> Option<&NamespaceStats> {
        self.namespaces.get(&namespace)
    }

    /// True before any namespace event has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// Per-engine, in-process counters keyed by namespace
///
/// Namespaces appear lazily on their first event. Nothing is persisted or
/// shared across engine instances.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    namespaces: DashMap<CacheNamespace, NamespaceRecord>,
    unscoped_errors: AtomicU64,
}

impl CacheMetrics {
    /// Create an empty metrics store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, namespace: CacheNamespace, apply: impl FnOnce(&mut NamespaceRecord)) {
        let mut record = self.namespaces.entry(namespace).or_default();
        apply(&mut record);
    }

    /// Record a read that found a value
    pub fn record_hit(&self, namespace: CacheNamespace, latency: Duration) {
        self.update(namespace, |record| {
            record.hits += 1;
            record.recompute_hit_rate();
            record.push_latency(latency);
        });
    }

    /// Record a read that found nothing
    pub fn record_miss(&self, namespace: CacheNamespace, latency: Duration) {
        self.update(namespace, |record| {
            record.misses += 1;
            record.recompute_hit_rate();
            record.push_latency(latency);
        });
    }

    /// Record a successful write
    pub fn record_set(&self, namespace: CacheNamespace, latency: Duration) {
        self.update(namespace, |record| {
            record.sets += 1;
            record.push_latency(latency);
        });
    }

    /// Record one delete event covering `count` keys
    pub fn record_delete(&self, namespace: CacheNamespace, latency: Duration, count: u64) {
        self.update(namespace, |record| {
            record.deletes += count;
            record.push_latency(latency);
        });
    }

    /// Record a failure, attributed to a namespace when one is known
    pub fn increment_error(&self, namespace: Option<CacheNamespace>, latency: Option<Duration>) {
        match namespace {
            Some(namespace) => self.update(namespace, |record| {
                record.errors += 1;
                if let Some(latency) = latency {
                    record.push_latency(latency);
                }
            }),
            None => {
                self.unscoped_errors.fetch_add(1, Ordering::Relaxed);
                debug!(latency = ?latency, "Recorded unscoped cache error");
            }
        }
    }

    /// Mean of retained latency samples for `namespace`, in milliseconds
    #[must_use]
    pub fn average_latency_ms(&self, namespace: CacheNamespace) -> Option<f64> {
        let record = self.namespaces.get(&namespace)?;
        if record.latencies_ms.is_empty() {
            return None;
        }
        let total: f64 = record.latencies_ms.iter().sum();
        Some(total / record.latencies_ms.len() as f64)
    }

    /// Immutable copy of every namespace's counters
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let namespaces = self
            .namespaces
            .iter()
            .map(|entry| (*entry.key(), entry.value().stats()))
            .collect();
        MetricsSnapshot {
            namespaces,
            unscoped_errors: self.unscoped_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_empty_before_any_event() {
        let metrics = CacheMetrics::new();
        assert!(metrics.snapshot().is_empty());
        assert_eq!(metrics.average_latency_ms(CacheNamespace::Charts), None);
    }

    #[test]
    fn test_hit_rate_follows_hits_and_misses() {
        let metrics = CacheMetrics::new();
        for _ in 0..3 {
            metrics.record_hit(CacheNamespace::MarketData, MS);
        }
        metrics.record_miss(CacheNamespace::MarketData, MS);

        let stats = *metrics.snapshot().get(CacheNamespace::MarketData).unwrap();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_zero_without_reads() {
        let metrics = CacheMetrics::new();
        metrics.record_set(CacheNamespace::Charts, MS);
        let stats = *metrics.snapshot().get(CacheNamespace::Charts).unwrap();
        assert_eq!(stats.sets, 1);
        assert!(stats.hit_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_delete_counts_keys_in_one_event() {
        let metrics = CacheMetrics::new();
        metrics.record_delete(CacheNamespace::Charts, MS, 150);
        let stats = *metrics.snapshot().get(CacheNamespace::Charts).unwrap();
        assert_eq!(stats.deletes, 150);
    }

    #[test]
    fn test_unscoped_errors_do_not_create_namespaces() {
        let metrics = CacheMetrics::new();
        metrics.increment_error(None, Some(MS));
        metrics.increment_error(Some(CacheNamespace::ApiResponses), None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.unscoped_errors, 1);
        assert_eq!(snapshot.namespaces.len(), 1);
        assert_eq!(snapshot.get(CacheNamespace::ApiResponses).unwrap().errors, 1);
    }

    #[test]
    fn test_latency_samples_are_bounded() {
        let metrics = CacheMetrics::new();
        for _ in 0..(LATENCY_SAMPLE_CAPACITY + 10) {
            metrics.record_set(CacheNamespace::SystemConfig, Duration::from_millis(2));
        }
        let average = metrics.average_latency_ms(CacheNamespace::SystemConfig).unwrap();
        assert!((average - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_updates_keep_hit_rate_consistent() {
        let metrics = Arc::new(CacheMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            metrics.record_hit(CacheNamespace::MarketData, MS);
                        } else {
                            metrics.record_miss(CacheNamespace::MarketData, MS);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = *metrics.snapshot().get(CacheNamespace::MarketData).unwrap();
        assert_eq!(stats.hits, 2_000);
        assert_eq!(stats.misses, 2_000);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
