// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application configuration types.
//!
//! Every section defaults field by field, so a config file only needs the
//! values it changes. Files may be JSON or YAML.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::telemetry::{Level, LogFormat};

/// Root configuration for a gantry application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, used as the default service name.
    pub name: String,

    /// Deployment environment (development, staging, production, ...)
    pub environment: String,

    pub log: LogConfig,
    pub tracing: TracingConfig,
    pub metrics: MetricsConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub interceptors: InterceptorsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "gantry".to_string(),
            environment: "development".to_string(),
            log: LogConfig::default(),
            tracing: TracingConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            interceptors: InterceptorsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Service name for spans: the tracing override or the app name.
    pub fn service_name(&self) -> &str {
        self.tracing.service_name.as_deref().unwrap_or(&self.name)
    }

    /// Check values serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.log.level.parse::<Level>().is_err() {
            return Err(ConfigError::invalid(
                "log.level",
                format!("unknown level {:?}", self.log.level),
            ));
        }
        if self.log.format.parse::<LogFormat>().is_err() {
            return Err(ConfigError::invalid(
                "log.format",
                format!("expected compact, full or json, got {:?}", self.log.format),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid(
                "database.max_connections",
                "must be at least 1",
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::invalid(
                "cache.max_entries",
                "must be at least 1 when the cache is enabled",
            ));
        }
        Ok(())
    }
}

/// `log` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// debug, info, warn or error. `RUST_LOG` takes precedence.
    pub level: String,

    /// compact, full or json.
    pub format: String,

    pub ansi: bool,
    pub file_line: bool,
    pub span_events: bool,

    /// Explicit `EnvFilter` directive, overriding both `level` and `RUST_LOG`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            ansi: true,
            file_line: false,
            span_events: false,
            filter: None,
        }
    }
}

/// `tracing` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: None,
        }
    }
}

/// `metrics` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// `database` section. No path means no database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub max_connections: u32,

    #[serde(with = "duration_text")]
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.path
            .as_deref()
            .map(|p| p.as_os_str() == ":memory:")
            .unwrap_or(false)
    }
}

/// `cache` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Default time-to-live for entries set without one.
    #[serde(with = "duration_text")]
    pub ttl: Duration,

    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

/// `interceptors` section: which built-ins get registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorsConfig {
    pub tracing: bool,
    pub logging: bool,
    pub metrics: bool,
}

impl Default for InterceptorsConfig {
    fn default() -> Self {
        Self {
            tracing: true,
            logging: true,
            metrics: true,
        }
    }
}

/// Durations as human-readable strings ("5s", "1m 30s"); plain numbers are
/// read as seconds.
mod duration_text {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Fractional(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Fractional(secs) if secs >= 0.0 && secs.is_finite() => {
                Ok(Duration::from_secs_f64(secs))
            }
            Raw::Fractional(secs) => Err(de::Error::custom(format!("invalid duration {}", secs))),
            Raw::Text(text) => humantime::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_name(), "gantry");
        assert!(config.interceptors.tracing);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
name: users
database:
  path: ":memory:"
  busy_timeout: 250ms
cache:
  ttl: 90
"#,
        )
        .unwrap();

        assert_eq!(config.name, "users");
        assert!(config.database.is_memory());
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.cache.ttl, Duration::from_secs(90));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_json_round_trip_uses_humantime() {
        let json = serde_json::to_value(AppConfig::default()).unwrap();
        assert_eq!(json["cache"]["ttl"], "5m");
        assert_eq!(json["database"]["busy_timeout"], "5s");
        let back: AppConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, AppConfig::default());
    }

    #[test]
    fn test_service_name_override() {
        let mut config = AppConfig::default();
        config.tracing.service_name = Some("users-api".to_string());
        assert_eq!(config.service_name(), "users-api");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.log.level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "log.level"
        ));

        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.log.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
