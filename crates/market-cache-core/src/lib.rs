// ABOUTME: Core types and constants for the market_cache engine
// ABOUTME: Foundation crate with error handling and cache default constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Market Cache Core
//!
//! Foundation crate shared by the cache engine. It is designed to change
//! infrequently so the engine crate can rebuild incrementally.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode` and the `AppResult` alias
//! - **constants**: namespace TTLs, pool bounds and scan defaults

/// Unified error handling with standard error codes
pub mod errors;

/// Cache defaults organized by concern
pub mod constants;
