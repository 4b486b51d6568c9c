// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span-based tracing interface and its `tracing` adapter.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use opentelemetry::trace::TraceContextExt;
use tracing::field;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::ids::{self, SpanContext};
use crate::attribute::{self, KeyValue};
use crate::context::Context;

/// Relationship of a span to its surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Server => "server",
            Self::Client => "client",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

impl SpanStatus {
    /// OpenTelemetry status code name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::Ok => "OK",
            Self::Error(_) => "ERROR",
        }
    }
}

/// Options for starting a span.
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub kind: SpanKind,
    pub attributes: Vec<KeyValue>,
}

impl SpanOptions {
    /// Internal span with no attributes.
    pub fn internal() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_attributes(mut self, attrs: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attrs);
        self
    }
}

/// Creates spans.
pub trait Tracer: Send + Sync {
    /// Start a span as a child of the context's current span.
    ///
    /// Returns a context carrying the new span along with the span itself.
    /// The caller must call [`Span::end`].
    fn start(&self, ctx: &Context, name: &str, opts: SpanOptions) -> (Context, Arc<dyn Span>);
}

/// A unit of traced work.
///
/// All methods take `&self`; spans are shared between the context that
/// carries them and the code that ends them.
pub trait Span: Send + Sync {
    fn span_context(&self) -> SpanContext;

    /// False once the span has ended, and always false for no-op spans.
    fn is_recording(&self) -> bool;

    fn set_attributes(&self, attrs: &[KeyValue]);

    fn add_event(&self, name: &str, attrs: &[KeyValue]);

    fn record_error(&self, err: &(dyn std::error::Error + 'static));

    fn set_status(&self, status: SpanStatus);

    /// End the span. Calls after the first have no effect.
    fn end(&self);

    /// Concrete type access, used by tracers to find their own parent spans.
    fn as_any(&self) -> &dyn Any;
}

/// Span that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpan;

impl Span for NoopSpan {
    fn span_context(&self) -> SpanContext {
        SpanContext::empty_context()
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn set_attributes(&self, _attrs: &[KeyValue]) {}

    fn add_event(&self, _name: &str, _attrs: &[KeyValue]) {}

    fn record_error(&self, _err: &(dyn std::error::Error + 'static)) {}

    fn set_status(&self, _status: SpanStatus) {}

    fn end(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared no-op span returned by contexts that carry no span.
pub(crate) static NOOP_SPAN: Lazy<Arc<dyn Span>> = Lazy::new(|| Arc::new(NoopSpan));

/// Tracer that produces [`NoopSpan`]s and leaves the context's span alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start(&self, ctx: &Context, _name: &str, _opts: SpanOptions) -> (Context, Arc<dyn Span>) {
        (ctx.clone(), Arc::clone(&NOOP_SPAN))
    }
}

/// [`Tracer`] that maps every span onto a `tracing` span.
///
/// Span fields follow the OpenTelemetry naming used by `tracing-opentelemetry`
/// (`otel.name`, `otel.kind`, `otel.status_code`), so an exporter layer can be
/// added to the subscriber without touching call sites.
#[derive(Debug, Clone)]
pub struct TracingTracer {
    service_name: Arc<str>,
}

impl TracingTracer {
    pub fn new(service_name: impl Into<Arc<str>>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Tracer for TracingTracer {
    fn start(&self, ctx: &Context, name: &str, opts: SpanOptions) -> (Context, Arc<dyn Span>) {
        let parent = ctx.span();
        let parent_id = parent
            .as_any()
            .downcast_ref::<TracingSpan>()
            .and_then(TracingSpan::id)
            .or_else(|| tracing::Span::current().id());

        let inner = tracing::info_span!(
            parent: parent_id,
            "span",
            otel.name = name,
            otel.kind = opts.kind.as_str(),
            otel.status_code = field::Empty,
            service.name = &*self.service_name,
            trace_id = field::Empty,
            span_id = field::Empty,
            attributes = field::Empty,
            error = field::Empty,
        );

        // With a tracing-opentelemetry layer installed the layer owns the ids;
        // otherwise they are generated here and the trace id is inherited.
        let sc = bridged_context(&inner).unwrap_or_else(|| {
            let parent_sc = parent.span_context();
            let trace_id = if parent_sc.is_valid() {
                parent_sc.trace_id()
            } else {
                ids::new_trace_id()
            };
            ids::sampled_context(trace_id, ids::new_span_id())
        });
        inner.record("trace_id", field::display(sc.trace_id()));
        inner.record("span_id", field::display(sc.span_id()));

        let span = Arc::new(TracingSpan {
            name: name.to_string(),
            context: sc,
            inner: Mutex::new(Some(inner)),
            attributes: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
        });
        if !opts.attributes.is_empty() {
            span.set_attributes(&opts.attributes);
        }

        let span: Arc<dyn Span> = span;
        (ctx.with_span(Arc::clone(&span)), span)
    }
}

/// Span context assigned by an OpenTelemetry layer, when one is installed.
fn bridged_context(span: &tracing::Span) -> Option<SpanContext> {
    let cx = span.context();
    let sc = cx.span().span_context().clone();
    sc.is_valid().then_some(sc)
}

/// A span produced by [`TracingTracer`].
pub struct TracingSpan {
    name: String,
    context: SpanContext,
    inner: Mutex<Option<tracing::Span>>,
    attributes: Mutex<Vec<KeyValue>>,
    ended: AtomicBool,
}

impl TracingSpan {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes recorded so far.
    pub fn attributes(&self) -> Vec<KeyValue> {
        self.attributes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Span context held by an OpenTelemetry layer for this span, if any.
    pub fn bridged_context(&self) -> Option<SpanContext> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(bridged_context)
    }

    fn id(&self) -> Option<tracing::Id> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(tracing::Span::id)
    }

    fn with_inner(&self, f: impl FnOnce(&tracing::Span)) {
        if let Some(span) = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            f(span);
        }
    }
}

impl fmt::Debug for TracingSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingSpan")
            .field("name", &self.name)
            .field("trace_id", &self.context.trace_id())
            .field("span_id", &self.context.span_id())
            .field("ended", &self.ended.load(Ordering::Acquire))
            .finish()
    }
}

impl Span for TracingSpan {
    fn span_context(&self) -> SpanContext {
        self.context.clone()
    }

    fn is_recording(&self) -> bool {
        !self.ended.load(Ordering::Acquire)
    }

    fn set_attributes(&self, attrs: &[KeyValue]) {
        if !self.is_recording() {
            return;
        }
        let rendered = {
            let mut stored = self.attributes.lock().unwrap_or_else(|e| e.into_inner());
            for kv in attrs {
                match stored.iter_mut().find(|existing| existing.key == kv.key) {
                    Some(existing) => existing.value = kv.value.clone(),
                    None => stored.push(kv.clone()),
                }
            }
            attribute::render(&stored)
        };
        self.with_inner(|span| {
            span.record("attributes", rendered.as_str());
        });
    }

    fn add_event(&self, name: &str, attrs: &[KeyValue]) {
        if !self.is_recording() {
            return;
        }
        let rendered = attribute::render(attrs);
        self.with_inner(|span| {
            tracing::info!(parent: span, attributes = %rendered, "{}", name);
        });
    }

    fn record_error(&self, err: &(dyn std::error::Error + 'static)) {
        if !self.is_recording() {
            return;
        }
        let message = err.to_string();
        self.with_inner(|span| {
            span.record("error", message.as_str());
            tracing::debug!(parent: span, error = %message, "exception");
        });
    }

    fn set_status(&self, status: SpanStatus) {
        if !self.is_recording() {
            return;
        }
        self.with_inner(|span| {
            span.record("otel.status_code", status.code());
            if let SpanStatus::Error(description) = &status {
                span.record("error", description.as_str());
            }
        });
    }

    fn end(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the last handle closes the `tracing` span.
        let _closed = self.inner.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;

    #[test]
    fn test_noop_tracer_keeps_context() {
        let ctx = Context::background();
        let (next, span) = NoopTracer.start(&ctx, "op", SpanOptions::internal());
        assert!(Context::ptr_eq(&ctx, &next));
        assert!(!span.is_recording());
        assert!(!span.span_context().is_valid());
    }

    #[test]
    fn test_tracing_tracer_child_inherits_trace_id() {
        let tracer = TracingTracer::new("test");
        let root = Context::background();
        let (ctx, parent) = tracer.start(&root, "parent", SpanOptions::internal());
        let (child_ctx, child) = tracer.start(&ctx, "child", SpanOptions::internal());

        assert_eq!(
            parent.span_context().trace_id(),
            child.span_context().trace_id()
        );
        assert_ne!(parent.span_context().span_id(), child.span_context().span_id());
        assert_eq!(
            child_ctx.span().span_context(),
            child.span_context()
        );
        // The original context is untouched.
        assert!(!root.span().span_context().is_valid());

        child.end();
        parent.end();
    }

    #[test]
    fn test_tracing_tracer_uses_opentelemetry_layer_ids() {
        use opentelemetry::trace::TracerProvider as _;
        use opentelemetry_sdk::trace::SdkTracerProvider;
        use tracing_subscriber::layer::SubscriberExt;

        let provider = SdkTracerProvider::builder().build();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("test")));

        tracing::subscriber::with_default(subscriber, || {
            let tracer = TracingTracer::new("test");
            let (ctx, parent) = tracer.start(&Context::background(), "parent", SpanOptions::internal());
            let (_child_ctx, child) = tracer.start(&ctx, "child", SpanOptions::internal());

            let concrete = parent.as_any().downcast_ref::<TracingSpan>().unwrap();
            let bridged = concrete.bridged_context();
            assert_eq!(bridged, Some(parent.span_context()));
            assert_eq!(
                parent.span_context().trace_id(),
                child.span_context().trace_id()
            );

            child.end();
            parent.end();
        });
    }

    #[test]
    fn test_tracing_span_end_is_idempotent() {
        let tracer = TracingTracer::new("test");
        let (_ctx, span) = tracer.start(&Context::background(), "op", SpanOptions::internal());
        assert!(span.is_recording());
        span.end();
        span.end();
        assert!(!span.is_recording());
    }

    #[test]
    fn test_tracing_span_attributes_overwrite_by_key() {
        let tracer = TracingTracer::new("test");
        let opts = SpanOptions::internal()
            .with_kind(SpanKind::Server)
            .with_attributes([attribute::string("a", "1")]);
        let (_ctx, span) = tracer.start(&Context::background(), "op", opts);
        span.set_attributes(&[attribute::string("a", "2"), attribute::int("b", 3)]);
        span.record_error(&ContextError::Canceled);
        span.set_status(SpanStatus::Error("boom".into()));

        let concrete = span.as_any().downcast_ref::<TracingSpan>().unwrap();
        assert_eq!(concrete.name(), "op");
        assert_eq!(attribute::render(&concrete.attributes()), "a=2 b=3");
        span.end();
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SpanStatus::Unset.code(), "UNSET");
        assert_eq!(SpanStatus::Ok.code(), "OK");
        assert_eq!(SpanStatus::Error("x".into()).code(), "ERROR");
    }
}
