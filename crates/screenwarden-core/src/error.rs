//! Core error types for screenwarden-core.
//!
//! This module defines the error hierarchy using thiserror. Only storage,
//! configuration and validation errors ever reach callers of the engine;
//! advisory and notification errors are recovered locally.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for screenwarden-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row in '{table}': {message}")]
    CorruptRow { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Connection mutex was poisoned by a panicking writer
    #[error("Database connection poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),

    /// OS keyring rejected a credential read or write
    #[error("Credential store error: {0}")]
    Credentials(String),
}

/// Validation errors for records entering the stores.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Referenced record does not exist
    #[error("{kind} with id {id} not found")]
    NotFound { kind: String, id: i64 },
}

impl ValidationError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Failures talking to the advisory oracle.
#[derive(Error, Debug)]
pub enum AdvisoryError {
    /// Advisory refresh is disabled in configuration
    #[error("Advisory oracle disabled")]
    Disabled,

    /// HTTP transport failure
    #[error("Oracle request failed: {0}")]
    Transport(String),

    /// Oracle answered with a non-success status
    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Oracle did not answer within the configured timeout
    #[error("Oracle timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Oracle output did not match the expected schema
    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

/// Failures delivering a notification to one guardian.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    /// Channel rejected or failed the delivery
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Channel is not configured
    #[error("Notification channel not configured: {0}")]
    NotConfigured(String),

    /// The incident deadline elapsed before this guardian was reached
    #[error("Notification timed out")]
    TimedOut,
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for AdvisoryError {
    fn from(err: reqwest::Error) -> Self {
        AdvisoryError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Delivery(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_core_error() {
        let err: CoreError = ValidationError::invalid("daily_limit_min", "must be > 0").into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation error: Invalid value for 'daily_limit_min': must be > 0"
        );
    }

    #[test]
    fn rusqlite_errors_map_to_query_failed() {
        let err: DatabaseError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }
}
