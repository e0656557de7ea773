// ABOUTME: Namespace policy table binding each namespace to its default expiration
// ABOUTME: Fixed at engine construction and consulted on every write without an override
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{CacheNamespace, CacheOptions};
use crate::config::NamespaceTtlConfig;
use std::time::Duration;

/// Immutable namespace → default TTL table
#[derive(Debug, Clone)]
pub struct NamespacePolicy {
    ttls: [Duration; CacheNamespace::ALL.len()],
}

impl NamespacePolicy {
    /// Build the table from configuration
    #[must_use]
    pub fn from_config(config: &NamespaceTtlConfig) -> Self {
        Self {
            ttls: CacheNamespace::ALL.map(|namespace| Duration::from_secs(config.secs_for(namespace))),
        }
    }

    /// Default expiration for `namespace`; zero means the entry never expires
    #[must_use]
    pub const fn default_ttl(&self, namespace: CacheNamespace) -> Duration {
        self.ttls[namespace as usize]
    }

    /// Expiration to send with a write: the per-call override if present, else the
    /// namespace default; `None` when the resolved TTL is zero
    #[must_use]
    pub fn resolve_ttl(&self, namespace: CacheNamespace, options: &CacheOptions) -> Option<Duration> {
        let ttl = options.ttl.unwrap_or_else(|| self.default_ttl(namespace));
        (!ttl.is_zero()).then_some(ttl)
    }
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self::from_config(&NamespaceTtlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_cache_core::constants::cache::{TTL_CHARTS_SECS, TTL_MARKET_DATA_SECS};

    #[test]
    fn test_defaults_per_namespace() {
        let policy = NamespacePolicy::default();
        assert_eq!(
            policy.default_ttl(CacheNamespace::MarketData),
            Duration::from_secs(TTL_MARKET_DATA_SECS)
        );
        assert_eq!(
            policy.default_ttl(CacheNamespace::Charts),
            Duration::from_secs(TTL_CHARTS_SECS)
        );
    }

    #[test]
    fn test_override_wins() {
        let policy = NamespacePolicy::default();
        let options = CacheOptions::with_ttl(Duration::from_secs(5));
        assert_eq!(
            policy.resolve_ttl(CacheNamespace::SystemConfig, &options),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_zero_means_no_expiration() {
        let config = NamespaceTtlConfig {
            user_preferences_secs: 0,
            ..NamespaceTtlConfig::default()
        };
        let policy = NamespacePolicy::from_config(&config);
        assert_eq!(
            policy.resolve_ttl(CacheNamespace::UserPreferences, &CacheOptions::default()),
            None
        );
        let zero_override = CacheOptions::with_ttl(Duration::ZERO);
        assert_eq!(policy.resolve_ttl(CacheNamespace::Charts, &zero_override), None);
    }
}
