// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request-scoped context.
//!
//! A [`Context`] carries the collaborators a call needs (logger, tracer,
//! meter, database executor), the active span, the cancellation state, and
//! the interceptors captured when it was created.
//!
//! Contexts are immutable. Every `with_*` method returns a new context and
//! leaves the receiver as it was, so a context can be cloned into other
//! threads and tasks freely. Cloning is a reference-count bump.

mod cancel;
mod factory;

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::attribute;
use crate::database::{Executor, NoopDatabase};
use crate::error::InterceptError;
use crate::intercept::{join_path, InterceptConfig, InterceptGuard, InterceptPart, Interceptor};
use crate::telemetry::metrics::InstrumentOptions;
use crate::telemetry::tracer::NOOP_SPAN;
use crate::telemetry::{Logger, Meter, NoopLogger, NoopMeter, NoopTracer, Span, Tracer};

pub use cancel::CancelHandle;
pub use factory::ContextFactory;

/// Counter bumped each time an interceptor fails to set up.
pub const SETUP_FAILURES_METRIC: &str = "interceptor.setup.failures";

#[derive(Clone)]
struct ContextInner {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    logger: Arc<dyn Logger>,
    tracer: Arc<dyn Tracer>,
    meter: Arc<dyn Meter>,
    db: Arc<dyn Executor>,
    span: Option<Arc<dyn Span>>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

/// Immutable, cheaply cloned carrier of request-scoped state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A root context with no-op collaborators, no interceptors, and a fresh
    /// cancellation token.
    pub fn background() -> Self {
        ContextBuilder::new().build()
    }

    /// Start building a root context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Whether two contexts are the same value, not merely equal.
    pub fn ptr_eq(a: &Context, b: &Context) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn derive(&self, f: impl FnOnce(&mut ContextInner)) -> Context {
        let mut inner = (*self.inner).clone();
        f(&mut inner);
        Context {
            inner: Arc::new(inner),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The logger, bound to this context when it supports that.
    ///
    /// Rebinding happens on every call, so the result reflects the span
    /// active in this context.
    pub fn logger(&self) -> Arc<dyn Logger> {
        match self.inner.logger.as_context_aware() {
            Some(aware) => aware.with_context(self),
            None => Arc::clone(&self.inner.logger),
        }
    }

    pub fn tracer(&self) -> Arc<dyn Tracer> {
        Arc::clone(&self.inner.tracer)
    }

    pub fn meter(&self) -> Arc<dyn Meter> {
        Arc::clone(&self.inner.meter)
    }

    /// The database executor. Inside a transaction this is the transaction.
    pub fn db(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.inner.db)
    }

    /// The active span, or a shared no-op span when there is none.
    pub fn span(&self) -> Arc<dyn Span> {
        match &self.inner.span {
            Some(span) => Arc::clone(span),
            None => Arc::clone(&NOOP_SPAN),
        }
    }

    /// Whether a span was set on this context.
    pub fn has_span(&self) -> bool {
        self.inner.span.is_some()
    }

    /// Interceptors captured when this context was created.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.inner.interceptors
    }

    // ------------------------------------------------------------------
    // Copy-on-write updates
    // ------------------------------------------------------------------

    pub fn with_logger(&self, logger: Arc<dyn Logger>) -> Context {
        self.derive(|c| c.logger = logger)
    }

    pub fn with_tracer(&self, tracer: Arc<dyn Tracer>) -> Context {
        self.derive(|c| c.tracer = tracer)
    }

    pub fn with_meter(&self, meter: Arc<dyn Meter>) -> Context {
        self.derive(|c| c.meter = meter)
    }

    pub fn with_db(&self, db: Arc<dyn Executor>) -> Context {
        self.derive(|c| c.db = db)
    }

    pub fn with_span(&self, span: Arc<dyn Span>) -> Context {
        self.derive(|c| c.span = Some(span))
    }

    /// Replace the interceptors applied by [`use_intercept`](Self::use_intercept).
    pub fn with_interceptors(&self, interceptors: Vec<Arc<dyn Interceptor>>) -> Context {
        self.derive(|c| c.interceptors = Arc::from(interceptors))
    }

    /// Replace the cancellation token and clear the deadline.
    pub fn with_cancellation(&self, token: CancellationToken) -> Context {
        self.derive(|c| {
            c.cancel = token;
            c.deadline = None;
        })
    }

    // ------------------------------------------------------------------
    // Interception
    // ------------------------------------------------------------------

    /// Apply this context's interceptors around a call.
    ///
    /// `parts` are path segments (joined with `.`) mixed with
    /// [`InterceptOption`](crate::intercept::InterceptOption)s. Returns the
    /// context to run the call with and a guard to finish with its error.
    ///
    /// With nothing to apply, the returned context is this same context
    /// ([`Context::ptr_eq`]) and the guard does nothing.
    ///
    /// ```rust,ignore
    /// let (ctx, guard) = ctx.use_intercept(["UserService", "GetUser"]);
    /// let result = load_user(&ctx, id);
    /// guard.finish_result(&result);
    /// ```
    pub fn use_intercept<I, P>(&self, parts: I) -> (Context, InterceptGuard)
    where
        I: IntoIterator<Item = P>,
        P: Into<InterceptPart>,
    {
        let (path, options) = join_path(parts);
        let mut config = InterceptConfig::default();
        for option in &options {
            option.apply(&mut config);
        }

        let mut selected = std::mem::take(&mut config.additional);
        selected.extend(
            self.inner
                .interceptors
                .iter()
                .filter(|i| config.should_apply(i.name()))
                .cloned(),
        );
        if selected.is_empty() {
            return (self.clone(), InterceptGuard::noop());
        }
        selected.sort_by_key(|i| i.order());

        let mut current = self.clone();
        let mut ends = Vec::with_capacity(selected.len());
        for interceptor in &selected {
            match interceptor.intercept(&current, &path) {
                Ok((next, end)) => {
                    current = next;
                    ends.push(end);
                }
                Err(err) => report_setup_failure(&current, interceptor.name(), &path, &err),
            }
        }

        (current, InterceptGuard::new(ends))
    }

    /// Run `f` inside [`use_intercept`](Self::use_intercept) and finish the
    /// guard with its error.
    pub fn run_intercepted<I, P, T, E, F>(&self, parts: I, f: F) -> Result<T, E>
    where
        I: IntoIterator<Item = P>,
        P: Into<InterceptPart>,
        E: Error + 'static,
        F: FnOnce(&Context) -> Result<T, E>,
    {
        let (ctx, guard) = self.use_intercept(parts);
        let result = f(&ctx);
        guard.finish_result(&result);
        result
    }
}

fn report_setup_failure(ctx: &Context, name: &str, path: &str, err: &InterceptError) {
    ctx.logger().warn(
        "interceptor setup failed",
        &[
            attribute::string("interceptor", name),
            attribute::string("method", path),
            attribute::string("error", err.to_string()),
        ],
    );
    if let Ok(counter) = ctx.meter().counter(
        SETUP_FAILURES_METRIC,
        InstrumentOptions::new().with_description("Interceptor setup failures"),
    ) {
        counter.add(1, &[attribute::string("interceptor", name)]);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.inner.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("Context")
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .field("span", &self.span().span_context())
            .field("interceptors", &names)
            .finish()
    }
}

/// Builder for root contexts. Unset collaborators are no-ops.
pub struct ContextBuilder {
    inner: ContextInner,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            inner: ContextInner {
                cancel: CancellationToken::new(),
                deadline: None,
                logger: Arc::new(NoopLogger),
                tracer: Arc::new(NoopTracer),
                meter: Arc::new(NoopMeter),
                db: Arc::new(NoopDatabase),
                span: None,
                interceptors: Arc::from(Vec::new()),
            },
        }
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.inner.logger = logger;
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.inner.tracer = tracer;
        self
    }

    pub fn meter(mut self, meter: Arc<dyn Meter>) -> Self {
        self.inner.meter = meter;
        self
    }

    pub fn db(mut self, db: Arc<dyn Executor>) -> Self {
        self.inner.db = db;
        self
    }

    pub fn interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.inner.interceptors = Arc::from(interceptors);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.inner.cancel = token;
        self
    }

    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(self.inner),
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
