// ABOUTME: Constants module root for the market_cache engine
// ABOUTME: Groups defaults by concern so configuration loaders share one source
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Cache TTLs, pool bounds, scan and health-check defaults
pub mod cache;

/// Redis connection defaults
pub mod redis;

/// Service identifiers used in structured logs
pub mod service_names {
    /// Name reported by the logging layer
    pub const MARKET_CACHE: &str = "market-cache";
}
