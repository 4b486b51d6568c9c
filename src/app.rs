// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application composition root.
//!
//! [`Application`] owns the single [`InterceptorRegistry`] and the single
//! [`ContextFactory`] bound to it. The built-in interceptors enabled by
//! configuration are registered while building, before any context is handed
//! out. Lifecycle hooks start in registration order and stop in reverse.
//!
//! # Example
//!
//! ```rust,ignore
//! let app = Application::builder(config)
//!     .with_hook(FnHook::new("warmup").on_start(|ctx| warm(ctx)))
//!     .build()?;
//! app.start()?;
//!
//! let ctx = app.context();
//! let (ctx, guard) = ctx.use_intercept(intercept_parts!["Users", "Get"]);
//! let result = users.get(&ctx, id);
//! guard.finish_result(&result);
//!
//! app.stop()?;
//! ```

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::attribute;
use crate::cache::{Cache, MemoryCache, NoopCache};
use crate::config::{AppConfig, DatabaseConfig};
use crate::context::{Context, ContextFactory};
use crate::database::{Database, Executor, SqliteDatabase, SqliteOptions};
use crate::error::{DatabaseError, LifecycleError};
use crate::intercept::{
    Interceptor, InterceptorRegistry, LoggingInterceptor, MetricsInterceptor, TracingInterceptor,
};
use crate::telemetry::{
    InMemoryMeter, Logger, Meter, MetricsSnapshot, NoopMeter, NoopTracer, Tracer, TracingLogger,
    TracingTracer,
};

/// Start/stop behavior attached to an [`Application`].
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &str;

    fn on_start(&self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stop(&self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }
}

type HookFn = Box<dyn Fn(&Context) -> anyhow::Result<()> + Send + Sync>;

/// A hook built from closures.
pub struct FnHook {
    name: String,
    start: Option<HookFn>,
    stop: Option<HookFn>,
}

impl FnHook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            stop: None,
        }
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.start = Some(Box::new(f));
        self
    }

    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.stop = Some(Box::new(f));
        self
    }
}

impl LifecycleHook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&self, ctx: &Context) -> anyhow::Result<()> {
        self.start.as_ref().map_or(Ok(()), |f| f(ctx))
    }

    fn on_stop(&self, ctx: &Context) -> anyhow::Result<()> {
        self.stop.as_ref().map_or(Ok(()), |f| f(ctx))
    }
}

impl std::fmt::Debug for FnHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHook").field("name", &self.name).finish()
    }
}

struct Storage {
    database: Arc<dyn Database>,
    executor: Arc<dyn Executor>,
}

/// Collects collaborators for an [`Application`].
pub struct ApplicationBuilder {
    config: AppConfig,
    logger: Option<Arc<dyn Logger>>,
    tracer: Option<Arc<dyn Tracer>>,
    meter: Option<Arc<InMemoryMeter>>,
    storage: Option<Storage>,
    cache: Option<Arc<dyn Cache>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl ApplicationBuilder {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            logger: None,
            tracer: None,
            meter: None,
            storage: None,
            cache: None,
            interceptors: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Use this meter instead of a fresh one. Ignored when metrics are
    /// disabled.
    pub fn with_meter(mut self, meter: Arc<InMemoryMeter>) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Use `db` instead of opening the configured SQLite database.
    pub fn with_database<D>(mut self, db: Arc<D>) -> Self
    where
        D: Database + 'static,
    {
        let executor: Arc<dyn Executor> = db.clone();
        self.storage = Some(Storage {
            database: db,
            executor,
        });
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register an application interceptor next to the built-ins.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_hook(mut self, hook: impl LifecycleHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Application, DatabaseError> {
        let config = self.config;
        let service = config.service_name().to_string();

        let logger = self.logger.unwrap_or_else(|| {
            TracingLogger::new().with(&[attribute::string("service", service.as_str())])
        });

        let tracer: Arc<dyn Tracer> = match self.tracer {
            Some(tracer) => tracer,
            None if config.tracing.enabled => Arc::new(TracingTracer::new(service.as_str())),
            None => Arc::new(NoopTracer),
        };

        let meter = if config.metrics.enabled {
            Some(self.meter.unwrap_or_else(|| Arc::new(InMemoryMeter::new())))
        } else {
            None
        };
        let context_meter: Arc<dyn Meter> = match &meter {
            Some(meter) => meter.clone(),
            None => Arc::new(NoopMeter),
        };

        let storage = match self.storage {
            Some(storage) => Some(storage),
            None => open_configured(&config.database)?,
        };

        let cache = self.cache.unwrap_or_else(|| -> Arc<dyn Cache> {
            if config.cache.enabled {
                Arc::new(MemoryCache::from_config(&config.cache))
            } else {
                Arc::new(NoopCache)
            }
        });

        let registry = Arc::new(InterceptorRegistry::new());
        if config.interceptors.tracing {
            registry.register(Arc::new(TracingInterceptor::new()));
        }
        if config.interceptors.logging {
            registry.register(Arc::new(LoggingInterceptor::new()));
        }
        if config.interceptors.metrics {
            registry.register(Arc::new(MetricsInterceptor::new()));
        }
        for interceptor in self.interceptors {
            registry.register(interceptor);
        }

        let mut factory = ContextFactory::new(Arc::clone(&registry))
            .with_logger(logger)
            .with_tracer(tracer)
            .with_meter(context_meter);
        if let Some(ref storage) = storage {
            factory = factory.with_db(Arc::clone(&storage.executor));
        }

        tracing::debug!(
            service = %service,
            interceptors = ?registry.names(),
            hooks = self.hooks.len(),
            "application built"
        );

        Ok(Application {
            config,
            registry,
            factory,
            meter,
            database: storage.map(|s| s.database),
            cache,
            hooks: self.hooks,
            started: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }
}

fn open_configured(config: &DatabaseConfig) -> Result<Option<Storage>, DatabaseError> {
    let Some(ref path) = config.path else {
        return Ok(None);
    };
    let options = if config.is_memory() {
        SqliteOptions::memory()
    } else {
        SqliteOptions::file(path).with_max_connections(config.max_connections)
    };
    let db = Arc::new(SqliteDatabase::open(
        options.with_busy_timeout(config.busy_timeout),
    )?);
    let executor: Arc<dyn Executor> = db.clone();
    Ok(Some(Storage {
        database: db,
        executor,
    }))
}

/// A wired gantry application.
pub struct Application {
    config: AppConfig,
    registry: Arc<InterceptorRegistry>,
    factory: ContextFactory,
    meter: Option<Arc<InMemoryMeter>>,
    database: Option<Arc<dyn Database>>,
    cache: Arc<dyn Cache>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    /// Number of hooks started; `None` until `start` is called.
    started: Mutex<Option<usize>>,
    shutdown: CancellationToken,
}

impl Application {
    pub fn builder(config: AppConfig) -> ApplicationBuilder {
        ApplicationBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &ContextFactory {
        &self.factory
    }

    pub fn database(&self) -> Option<&Arc<dyn Database>> {
        self.database.as_ref()
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// The in-memory meter, when metrics are enabled.
    pub fn meter(&self) -> Option<&Arc<InMemoryMeter>> {
        self.meter.as_ref()
    }

    pub fn metrics_snapshot(&self) -> Option<MetricsSnapshot> {
        self.meter.as_ref().map(|m| m.snapshot())
    }

    /// Cancelled by [`stop`](Self::stop).
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// A root context for one unit of work. Cancelled when the application
    /// stops.
    pub fn context(&self) -> Context {
        self.factory.new_context(self.shutdown.child_token())
    }

    pub fn is_started(&self) -> bool {
        self.started_count().is_some()
    }

    fn started_count(&self) -> Option<usize> {
        *self.started.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run every `on_start` hook in order.
    ///
    /// If one fails, the hooks already started are stopped in reverse and the
    /// failure is returned.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        if started.is_some() {
            return Err(LifecycleError::AlreadyStarted);
        }

        let ctx = self.context();
        for (index, hook) in self.hooks.iter().enumerate() {
            tracing::debug!(hook = hook.name(), "starting");
            if let Err(source) = hook.on_start(&ctx) {
                tracing::error!(hook = hook.name(), error = %source, "start hook failed");
                for undo in self.hooks[..index].iter().rev() {
                    if let Err(e) = undo.on_stop(&self.factory.background()) {
                        tracing::warn!(hook = undo.name(), error = %e, "stop hook failed during rollback");
                    }
                }
                return Err(LifecycleError::StartFailed {
                    hook: hook.name().to_string(),
                    source,
                });
            }
        }

        *started = Some(self.hooks.len());
        tracing::info!(
            service = self.config.service_name(),
            hooks = self.hooks.len(),
            "application started"
        );
        Ok(())
    }

    /// Cancel outstanding contexts, run `on_stop` hooks in reverse, then
    /// close the database.
    ///
    /// Every hook runs even if an earlier one fails; the first failure is
    /// returned. Stopping an application that never started only cancels
    /// and closes.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        let count = self
            .started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or(0);
        self.shutdown.cancel();

        let ctx = self.factory.background();
        let mut first_error = None;
        for hook in self.hooks[..count].iter().rev() {
            if let Err(source) = hook.on_stop(&ctx) {
                tracing::warn!(hook = hook.name(), error = %source, "stop hook failed");
                first_error.get_or_insert(LifecycleError::StopFailed {
                    hook: hook.name().to_string(),
                    source,
                });
            }
        }

        if let Some(db) = &self.database {
            if let Err(e) = db.close() {
                tracing::warn!(error = %e, "closing database failed");
                first_error.get_or_insert(LifecycleError::StopFailed {
                    hook: "database".to_string(),
                    source: e.into(),
                });
            }
        }

        tracing::info!(service = self.config.service_name(), "application stopped");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("service", &self.config.service_name())
            .field("registry", &self.registry)
            .field("hooks", &self.hooks.len())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
