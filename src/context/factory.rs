// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Creates root contexts bound to an interceptor registry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Context, ContextBuilder};
use crate::database::{Executor, NoopDatabase};
use crate::intercept::InterceptorRegistry;
use crate::telemetry::{Logger, Meter, NoopLogger, NoopMeter, NoopTracer, Tracer};

/// Builds contexts carrying the application's collaborators.
///
/// The registry is read on every [`new_context`](Self::new_context) call, so
/// interceptors registered later apply to contexts created later.
#[derive(Clone)]
pub struct ContextFactory {
    registry: Arc<InterceptorRegistry>,
    logger: Arc<dyn Logger>,
    tracer: Arc<dyn Tracer>,
    meter: Arc<dyn Meter>,
    db: Arc<dyn Executor>,
}

impl ContextFactory {
    /// Create a factory with no-op collaborators.
    pub fn new(registry: Arc<InterceptorRegistry>) -> Self {
        Self {
            registry,
            logger: Arc::new(NoopLogger),
            tracer: Arc::new(NoopTracer),
            meter: Arc::new(NoopMeter),
            db: Arc::new(NoopDatabase),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_meter(mut self, meter: Arc<dyn Meter>) -> Self {
        self.meter = meter;
        self
    }

    pub fn with_db(mut self, db: Arc<dyn Executor>) -> Self {
        self.db = db;
        self
    }

    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.registry
    }

    /// Create a context cancelled together with `token`.
    pub fn new_context(&self, token: CancellationToken) -> Context {
        ContextBuilder::new()
            .cancellation(token)
            .logger(Arc::clone(&self.logger))
            .tracer(Arc::clone(&self.tracer))
            .meter(Arc::clone(&self.meter))
            .db(Arc::clone(&self.db))
            .interceptors(self.registry.get_all())
            .build()
    }

    /// Create a context with its own, never-cancelled token.
    pub fn background(&self) -> Context {
        self.new_context(CancellationToken::new())
    }
}

impl std::fmt::Debug for ContextFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFactory")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterceptError;
    use crate::intercept::{noop_end, EndFn, Interceptor};

    struct Named(&'static str);

    impl Interceptor for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn order(&self) -> i32 {
            0
        }

        fn intercept(&self, ctx: &Context, _: &str) -> Result<(Context, EndFn), InterceptError> {
            Ok((ctx.clone(), noop_end()))
        }
    }

    #[test]
    fn test_registry_is_read_live() {
        let registry = Arc::new(InterceptorRegistry::new());
        let factory = ContextFactory::new(Arc::clone(&registry));

        let before = factory.background();
        registry.register(Arc::new(Named("late")));
        let after = factory.background();

        assert!(before.interceptors().is_empty());
        assert_eq!(after.interceptors().len(), 1);
        assert_eq!(after.interceptors()[0].name(), "late");
    }

    #[test]
    fn test_new_context_follows_token() {
        let factory = ContextFactory::new(Arc::new(InterceptorRegistry::new()));
        let token = CancellationToken::new();
        let ctx = factory.new_context(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
