// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Built-in tracing, logging, and metrics interceptors.

use std::time::Instant;

use super::{end_fn, EndFn, Interceptor, ORDER_LOGGING, ORDER_METRICS, ORDER_TRACING};
use crate::attribute::{self, KeyValue};
use crate::context::Context;
use crate::error::InterceptError;
use crate::telemetry::metrics::InstrumentOptions;
use crate::telemetry::tracer::{SpanOptions, SpanStatus};

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Opens a span named after the method path around every call.
///
/// The span becomes the context's current span, so later interceptors and the
/// call itself log and trace under it. A business error is recorded on the
/// span and sets its status to error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl TracingInterceptor {
    pub const NAME: &'static str = "tracing";

    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for TracingInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> i32 {
        ORDER_TRACING
    }

    fn intercept(&self, ctx: &Context, full_path: &str) -> Result<(Context, EndFn), InterceptError> {
        let (ctx, span) = ctx.tracer().start(ctx, full_path, SpanOptions::internal());
        let end = end_fn(move |err| {
            if let Some(err) = err {
                span.record_error(err);
                span.set_status(SpanStatus::Error(err.to_string()));
            }
            span.end();
        });
        Ok((ctx, end))
    }
}

/// Logs the start and outcome of every call.
///
/// Start is logged at debug level. Completion is one line: debug on success,
/// error with the failure otherwise, both carrying the duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub const NAME: &'static str = "logging";

    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> i32 {
        ORDER_LOGGING
    }

    fn intercept(&self, ctx: &Context, full_path: &str) -> Result<(Context, EndFn), InterceptError> {
        let logger = ctx.logger();
        let method = full_path.to_string();
        logger.debug("method started", &[attribute::string("method", method.as_str())]);

        let start = Instant::now();
        let end = end_fn(move |err| {
            let mut fields = vec![
                attribute::string("method", method),
                attribute::float("duration_ms", elapsed_ms(start)),
            ];
            match err {
                Some(err) => {
                    fields.push(attribute::string("error", err.to_string()));
                    logger.error("method failed", &fields);
                }
                None => logger.debug("method completed", &fields),
            }
        });
        Ok((ctx.clone(), end))
    }
}

/// Counts calls and records their duration.
///
/// Uses two instruments from the context's meter: the `method.calls` counter
/// and the `method.duration` histogram (milliseconds). Both are tagged with
/// `method` and `outcome` (`ok` or `error`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsInterceptor;

impl MetricsInterceptor {
    pub const NAME: &'static str = "metrics";
    pub const CALLS: &'static str = "method.calls";
    pub const DURATION: &'static str = "method.duration";

    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> i32 {
        ORDER_METRICS
    }

    fn intercept(&self, ctx: &Context, full_path: &str) -> Result<(Context, EndFn), InterceptError> {
        let meter = ctx.meter();
        let calls = meter.counter(
            Self::CALLS,
            InstrumentOptions::new().with_description("Intercepted method calls"),
        )?;
        let duration = meter.histogram(
            Self::DURATION,
            InstrumentOptions::new()
                .with_description("Intercepted method duration")
                .with_unit("ms"),
        )?;

        let method = full_path.to_string();
        let start = Instant::now();
        let end = end_fn(move |err| {
            let outcome = if err.is_some() { "error" } else { "ok" };
            let attrs: [KeyValue; 2] = [
                attribute::string("method", method),
                attribute::string("outcome", outcome),
            ];
            calls.add(1, &attrs);
            duration.record(elapsed_ms(start), &attrs);
        });
        Ok((ctx.clone(), end))
    }
}
