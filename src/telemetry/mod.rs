// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging, tracing, and metrics collaborators.
//!
//! Each concern is an object-safe trait carried by a
//! [`Context`](crate::context::Context):
//!
//! - **[`Logger`]**: structured log records. [`TracingLogger`] forwards them
//!   to `tracing` and binds the current trace and span ids.
//! - **[`Tracer`] / [`Span`]**: spans identified by OpenTelemetry ids.
//!   [`TracingTracer`] backs every span with a `tracing` span, which
//!   `tracing-opentelemetry` exports when [`init_telemetry`] installs it.
//! - **[`Meter`]**: counters, histograms, and gauges. [`InMemoryMeter`]
//!   aggregates in process and prints a report.
//!
//! Every trait has a no-op implementation so a context is always complete.
//!
//! # Usage
//!
//! Initialize the subscriber once at application startup:
//!
//! ```rust,ignore
//! use gantry::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod ids;
mod init;
pub mod logger;
pub mod metrics;
pub mod tracer;

pub use ids::{
    new_span_id, new_trace_id, parse_span_id, parse_trace_id, traceparent, IdParseError,
    SpanContext, SpanId, TraceFlags, TraceId,
};
pub use init::{init_telemetry, LogFormat, TelemetryConfig, TelemetryGuard};
pub use logger::{
    ContextAwareLogger, Field, Level, Logger, MemoryLogger, NoopLogger, Record, TracingLogger,
};
pub use metrics::{
    Counter, Gauge, Histogram, HistogramData, InMemoryMeter, InstrumentOptions, Meter,
    MetricsSnapshot, NoopMeter, UpDownCounter,
};
pub use tracer::{
    NoopSpan, NoopTracer, Span, SpanKind, SpanOptions, SpanStatus, Tracer,
    TracingSpan, TracingTracer,
};
