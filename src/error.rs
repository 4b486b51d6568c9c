// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the gantry framework.
//!
//! Each collaborator interface has its own strongly-typed error, defined with
//! `thiserror`. Application-level code propagates them through `anyhow`.
//!
//! Every collaborator error carries a `NoAdapter` variant. The no-op
//! implementations return it for operations that need a real backend, so a
//! missing adapter shows up as misconfiguration instead of a runtime fault.

use thiserror::Error;

/// Message shared by every `NoAdapter` variant.
pub const NO_ADAPTER: &str = "no adapter provided";

/// Why a [`Context`](crate::context::Context) stopped being usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors raised while an interceptor sets itself up for a call.
///
/// These never reach the caller of `use_intercept`; the failing interceptor is
/// logged and skipped.
#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("interceptor {name} failed to set up: {message}")]
    Setup { name: String, message: String },

    #[error("interceptor metrics unavailable: {0}")]
    Metrics(#[from] MetricsError),

    #[error("context is no longer active: {0}")]
    Context(#[from] ContextError),
}

impl InterceptError {
    /// Create a setup error for the named interceptor.
    pub fn setup(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Setup {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by meters and instruments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("invalid instrument name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("instrument {name} already registered as a {existing}")]
    KindMismatch { name: String, existing: &'static str },

    #[error("{}", NO_ADAPTER)]
    NoAdapter,
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Config watch error: {0}")]
    Watch(String),

    #[error("{}", NO_ADAPTER)]
    NoAdapter,
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

impl From<notify::Error> for ConfigError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

/// Errors that can occur during database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("query aborted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("SQL error: {0}")]
    Sql(String),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("transaction already finished")]
    TransactionFinished,

    #[error("executor does not support transactions")]
    TransactionsUnsupported,

    #[error("column {0} not found")]
    ColumnNotFound(String),

    #[error("column {column} is not {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("{}", NO_ADAPTER)]
    NoAdapter,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err.to_string())
    }
}

impl From<r2d2::Error> for DatabaseError {
    fn from(err: r2d2::Error) -> Self {
        Self::Pool(err.to_string())
    }
}

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache operation aborted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("cache value could not be encoded: {0}")]
    Serialization(String),

    #[error("cache key must not be empty")]
    EmptyKey,

    #[error("{}", NO_ADAPTER)]
    NoAdapter,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by application lifecycle hooks.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("start hook {hook} failed: {source}")]
    StartFailed {
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stop hook {hook} failed: {source}")]
    StopFailed {
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("application already started")]
    AlreadyStarted,
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_adapter_message_is_shared() {
        assert_eq!(ConfigError::NoAdapter.to_string(), NO_ADAPTER);
        assert_eq!(DatabaseError::NoAdapter.to_string(), NO_ADAPTER);
        assert_eq!(CacheError::NoAdapter.to_string(), NO_ADAPTER);
        assert_eq!(MetricsError::NoAdapter.to_string(), NO_ADAPTER);
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ConfigError = io_err.into();
        assert!(matches!(err, ConfigError::NotFound(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ConfigError = io_err.into();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let err: ConfigError = result.unwrap_err().into();
        assert!(matches!(err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_database_error_from_context() {
        let err: DatabaseError = ContextError::DeadlineExceeded.into();
        assert_eq!(err.to_string(), "query aborted: context deadline exceeded");
    }

    #[test]
    fn test_intercept_error_display() {
        let err = InterceptError::setup("tracing", "tracer unavailable");
        let display = format!("{}", err);
        assert!(display.contains("tracing"));
        assert!(display.contains("tracer unavailable"));
    }
}
