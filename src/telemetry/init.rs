// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber initialization and configuration.

use std::io;
use std::str::FromStr;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{AppConfig, LogConfig};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "full" | "pretty" => Ok(Self::Full),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Whether to include span events (enter/exit).
    pub include_span_events: bool,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to include target module path.
    pub include_target: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    pub format: LogFormat,

    /// Custom filter directive (overrides default_level and RUST_LOG).
    pub filter_directive: Option<String>,

    /// Service name for the OpenTelemetry layer. `None` leaves the layer out.
    pub otel_service: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            include_span_events: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            format: LogFormat::Compact,
            filter_directive: None,
            otel_service: None,
        }
    }
}

impl TelemetryConfig {
    /// Create a config suitable for development with verbose output.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_span_events: true,
            include_file_line: true,
            format: LogFormat::Full,
            ..Self::default()
        }
    }

    /// Create a config suitable for production: JSON lines, warnings and up.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            ansi_colors: false,
            format: LogFormat::Json,
            ..Self::default()
        }
    }

    /// Build from the `log` section of the application config.
    ///
    /// Unknown levels fall back to `info` and unknown formats to compact;
    /// [`AppConfig::validate`](crate::config::AppConfig::validate) reports them.
    pub fn from_log_config(log: &LogConfig) -> Self {
        Self {
            default_level: Level::from_str(&log.level).unwrap_or(Level::INFO),
            include_span_events: log.span_events,
            include_file_line: log.file_line,
            include_target: true,
            ansi_colors: log.ansi,
            format: log.format.parse().unwrap_or_default(),
            filter_directive: log.filter.clone(),
            otel_service: None,
        }
    }

    /// Build from the whole application config. Enabled tracing installs the
    /// OpenTelemetry layer under the configured service name.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let telemetry = Self::from_log_config(&config.log);
        if config.tracing.enabled {
            telemetry.with_otel(config.service_name())
        } else {
            telemetry
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set a custom filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Bridge `tracing` spans into OpenTelemetry under `service`.
    pub fn with_otel(mut self, service: impl Into<String>) -> Self {
        self.otel_service = Some(service.into());
        self
    }
}

/// Guard returned by [`init_telemetry`].
///
/// Keep this guard alive for the duration of your program. Dropping it
/// shuts down the OpenTelemetry tracer provider, if one was installed.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are bridged into OpenTelemetry.
    pub fn has_otel(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "tracer provider shutdown failed");
            }
        }
    }
}

/// Initialize the global `tracing` subscriber.
///
/// This should be called once at application startup. A second call fails
/// because a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    // RUST_LOG wins over the default level, an explicit directive wins over both
    let filter = match &config.filter_directive {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string())),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string())),
    };

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    let provider = config
        .otel_service
        .as_ref()
        .map(|_| SdkTracerProvider::builder().build());
    let otel_layer = provider
        .as_ref()
        .zip(config.otel_service.clone())
        .map(|(provider, service)| tracing_opentelemetry::layer().with_tracer(provider.tracer(service)));

    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);
    let result = match config.format {
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init(),
        LogFormat::Full => registry.with(fmt_layer).try_init(),
        LogFormat::Json => registry
            .with(fmt_layer.json().with_current_span(true).with_span_list(false))
            .try_init(),
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { provider })
}
