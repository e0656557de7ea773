// ABOUTME: JSON text codec turning cached values into store payloads and back
// ABOUTME: Decode failures are reported as serialization errors, never as cache misses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode `value` as UTF-8 JSON text
///
/// # Errors
///
/// Returns `SerializationError` when the value cannot be represented as JSON
/// (for example a map keyed by non-string values)
pub fn encode<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::serialization(format!("Cache serialization failed: {e}")).with_source(e))
}

/// Decode JSON text produced by [`encode`]
///
/// # Errors
///
/// Returns `SerializationError` for corrupted payloads or payloads written with a different shape
pub fn decode<T: DeserializeOwned>(payload: &str) -> AppResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        AppError::serialization(format!("Cache deserialization failed: {e}")).with_source(e)
    })
}
