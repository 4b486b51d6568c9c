// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide interceptor registry.

use std::sync::{Arc, RwLock};

use super::Interceptor;

/// The set of interceptors applied to every context.
///
/// Created once at startup and shared as `Arc<InterceptorRegistry>`. It is the
/// only mutable state the interceptor layer shares between threads:
/// registration takes the write lock, and [`get_all`](Self::get_all) takes
/// the read lock and hands back a sorted copy.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(InterceptorRegistry::new());
/// registry.register(Arc::new(TracingInterceptor::new()));
/// let factory = ContextFactory::new(Arc::clone(&registry));
/// ```
#[derive(Default)]
pub struct InterceptorRegistry {
    interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
}

impl InterceptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor. Duplicates are kept.
    pub fn register(&self, interceptor: Arc<dyn Interceptor>) {
        tracing::debug!(
            name = interceptor.name(),
            order = interceptor.order(),
            "registering interceptor"
        );
        self.interceptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(interceptor);
    }

    /// Builder-style registration.
    pub fn with(self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.register(interceptor);
        self
    }

    /// Snapshot of every interceptor, sorted by order.
    ///
    /// The sort is stable, so equal orders keep registration order. Later
    /// registrations do not affect a returned snapshot.
    pub fn get_all(&self) -> Vec<Arc<dyn Interceptor>> {
        let mut all = self
            .interceptors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        all.sort_by_key(|i| i.order());
        all
    }

    /// Names in application order.
    pub fn names(&self) -> Vec<String> {
        self.get_all().iter().map(|i| i.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("interceptors", &self.names())
            .finish()
    }
}
