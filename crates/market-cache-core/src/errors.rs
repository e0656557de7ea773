// ABOUTME: Unified error type and error codes for cache engine operations
// ABOUTME: Maps configuration, argument, serialization and store failures to AppError
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling
//!
//! Every fallible engine operation returns [`AppResult`]. The [`ErrorCode`]
//! tells callers which class of failure occurred so they can decide whether
//! it is worth degrading (store connectivity) or failing loudly (configuration
//! and data integrity).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error codes used throughout the cache engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Validation (3000-3999)
    /// Empty key, unknown namespace or another rejected argument
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,

    // Backing store (5000-5999)
    /// A connection could not be created, validated or lent
    #[serde(rename = "STORE_UNAVAILABLE")]
    StoreUnavailable = 5001,
    /// A command failed on an established connection
    #[serde(rename = "STORE_COMMAND_FAILED")]
    StoreCommandFailed = 5002,

    // Configuration (6000-6999)
    /// Required configuration is absent
    #[serde(rename = "CONFIG_MISSING")]
    ConfigMissing = 6001,
    /// Configuration is present but unusable
    #[serde(rename = "CONFIG_INVALID")]
    ConfigInvalid = 6002,

    // Internal (9000-9999)
    /// Value could not be encoded or a stored payload could not be decoded
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9003,
}

impl ErrorCode {
    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::StoreUnavailable => "The cache backing store is unavailable",
            Self::StoreCommandFailed => "A cache backing store command failed",
            Self::ConfigMissing => "Required configuration is missing",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }

    /// Whether this code describes a backing-store connectivity problem
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::StoreCommandFailed)
    }
}

/// Unified error type for the cache engine
#[derive(Debug, Error)]
#[error("{}: {}", .code.description(), .message)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Structured context (e.g. partial counts for aborted bulk operations)
    pub details: serde_json::Value,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
            source: None,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether the failure came from the backing store rather than the data or caller
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        self.code.is_connectivity()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Convenience functions for creating common errors
impl AppError {
    /// Invalid argument supplied by the caller
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Required configuration is absent
    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigMissing, message)
    }

    /// Configuration is present but inconsistent
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Encoding or decoding failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Connection could not be created, validated or acquired
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreUnavailable, message)
    }

    /// Command failed on an established connection
    pub fn store_command(command: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::StoreCommandFailed,
            format!("{command}: {}", message.into()),
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(AppError::store_unavailable("down").is_connectivity());
        assert!(AppError::store_command("GET", "reset").is_connectivity());
        assert!(!AppError::serialization("bad json").is_connectivity());
        assert!(!AppError::invalid_input("empty key").is_connectivity());
    }

    #[test]
    fn test_display_includes_description_and_message() {
        let error = AppError::store_command("SCAN", "connection reset");
        let rendered = error.to_string();
        assert!(rendered.starts_with("A cache backing store command failed"));
        assert!(rendered.contains("SCAN: connection reset"));
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::ConfigMissing).unwrap();
        assert_eq!(json, "\"CONFIG_MISSING\"");
    }

    #[test]
    fn test_serde_json_error_converts_to_serialization() {
        let parse_error = serde_json::from_str::<u32>("not-a-number").unwrap_err();
        let error = AppError::from(parse_error);
        assert_eq!(error.code, ErrorCode::SerializationError);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_with_details() {
        let error =
            AppError::store_command("DEL", "timeout").with_details(serde_json::json!({"deleted": 7}));
        assert_eq!(error.details["deleted"], 7);
    }
}
