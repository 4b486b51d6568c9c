// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the interceptor hot path.
//!
//! Run with: `cargo bench --bench intercept`

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use gantry::intercept::{LoggingInterceptor, MetricsInterceptor, TracingInterceptor};
use gantry::telemetry::{InMemoryMeter, NoopLogger, TracingTracer};
use gantry::{intercept_parts, with_only, Context, ContextFactory, Interceptor, InterceptorRegistry};

fn builtins() -> Arc<InterceptorRegistry> {
    let tracing: Arc<dyn Interceptor> = Arc::new(TracingInterceptor::new());
    let logging: Arc<dyn Interceptor> = Arc::new(LoggingInterceptor::new());
    let metrics: Arc<dyn Interceptor> = Arc::new(MetricsInterceptor::new());
    Arc::new(
        InterceptorRegistry::new()
            .with(tracing)
            .with(logging)
            .with(metrics),
    )
}

/// Benchmark `use_intercept` with and without interceptors.
fn bench_use_intercept(c: &mut Criterion) {
    let mut group = c.benchmark_group("use_intercept");
    group.throughput(Throughput::Elements(1));

    let empty = Context::background();
    group.bench_function("no_interceptors", |b| {
        b.iter(|| {
            let (ctx, guard) = empty.use_intercept(black_box(intercept_parts!["Svc", "Method"]));
            guard.finish(None);
            ctx
        });
    });

    let factory = ContextFactory::new(builtins())
        .with_logger(Arc::new(NoopLogger))
        .with_tracer(Arc::new(TracingTracer::new("bench")))
        .with_meter(Arc::new(InMemoryMeter::new()));
    let wired = factory.background();

    group.bench_function("builtins", |b| {
        b.iter(|| {
            let (ctx, guard) = wired.use_intercept(black_box(intercept_parts!["Svc", "Method"]));
            guard.finish(None);
            ctx
        });
    });

    group.bench_function("builtins_only_metrics", |b| {
        b.iter(|| {
            let (ctx, guard) = wired.use_intercept(black_box(intercept_parts![
                "Svc",
                "Method",
                with_only(["metrics"])
            ]));
            guard.finish(None);
            ctx
        });
    });

    group.finish();
}

/// Benchmark context derivation.
fn bench_context_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("context");
    let ctx = Context::background();
    let meter = Arc::new(InMemoryMeter::new());

    group.bench_function("with_meter", |b| {
        b.iter(|| black_box(ctx.with_meter(meter.clone())));
    });

    group.bench_function("clone", |b| {
        b.iter(|| black_box(ctx.clone()));
    });

    group.finish();
}

criterion_group!(benches, bench_use_intercept, bench_context_derive);
criterion_main!(benches);
