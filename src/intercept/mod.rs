// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Interceptors: cross-cutting behavior wrapped around business calls.
//!
//! This module defines the core abstractions of the interceptor layer:
//! - [`Interceptor`] trait that every concern implements
//! - [`InterceptGuard`] that runs end functions in reverse order
//! - [`InterceptorRegistry`] holding the process-wide interceptor set
//! - [`InterceptConfig`] and [`join_path`] for per-call selection
//!
//! Interceptors are applied by
//! [`Context::use_intercept`](crate::context::Context::use_intercept).
//! Lower [`order`](Interceptor::order) values run first on the way in and
//! last on the way out.
//!
//! # Example
//!
//! ```rust,ignore
//! use gantry::intercept::{end_fn, EndFn, Interceptor};
//!
//! struct Audit;
//!
//! impl Interceptor for Audit {
//!     fn name(&self) -> &str { "audit" }
//!     fn order(&self) -> i32 { 400 }
//!
//!     fn intercept(&self, ctx: &Context, path: &str) -> Result<(Context, EndFn), InterceptError> {
//!         let path = path.to_string();
//!         Ok((ctx.clone(), end_fn(move |err| audit_log(&path, err.is_some()))))
//!     }
//! }
//! ```

mod builtin;
mod config;
mod registry;

use std::error::Error;
use std::fmt;

use crate::context::Context;
use crate::error::InterceptError;

pub use builtin::{LoggingInterceptor, MetricsInterceptor, TracingInterceptor};
pub use config::{
    join_path, with_additional, with_exclude, with_only, InterceptConfig, InterceptOption,
    InterceptPart,
};
pub use registry::InterceptorRegistry;

/// Order of [`TracingInterceptor`]. Spans wrap everything else.
pub const ORDER_TRACING: i32 = 100;

/// Order of [`LoggingInterceptor`].
pub const ORDER_LOGGING: i32 = 200;

/// Order of [`MetricsInterceptor`].
pub const ORDER_METRICS: i32 = 300;

/// First order value reserved for application interceptors.
pub const ORDER_CUSTOM: i32 = 400;

/// Teardown half of an interceptor.
///
/// Receives the business error, if any, read-only. Called at most once.
pub type EndFn = Box<dyn FnOnce(Option<&(dyn Error + 'static)>) + Send>;

/// Box a closure as an [`EndFn`].
pub fn end_fn<F>(f: F) -> EndFn
where
    F: FnOnce(Option<&(dyn Error + 'static)>) + Send + 'static,
{
    Box::new(f)
}

/// An end function that does nothing.
pub fn noop_end() -> EndFn {
    Box::new(|_| {})
}

/// A cross-cutting concern applied around intercepted calls.
///
/// Implementations must be safe to share across threads. Registered once,
/// invoked once per intercepted call.
pub trait Interceptor: Send + Sync {
    /// Unique identifier, used by `only` / `exclude` filtering.
    fn name(&self) -> &str;

    /// Position in the chain. Lower runs first; ties keep registration order.
    fn order(&self) -> i32;

    /// Set up for one call on `full_path`.
    ///
    /// Returns the context the rest of the chain should see and the function
    /// to run when the call finishes. An error skips this interceptor for the
    /// call; it never fails the call itself.
    fn intercept(&self, ctx: &Context, full_path: &str) -> Result<(Context, EndFn), InterceptError>;
}

impl fmt::Debug for dyn Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("name", &self.name())
            .field("order", &self.order())
            .finish()
    }
}

/// Pending end functions of one intercepted call.
///
/// [`finish`](Self::finish) runs them in reverse setup order and consumes the
/// guard. A guard dropped without `finish` (early return, `?`, or unwinding)
/// finishes with no error.
#[must_use = "dropping the guard ends the interceptors immediately"]
pub struct InterceptGuard {
    ends: Vec<EndFn>,
}

impl InterceptGuard {
    pub(crate) fn new(ends: Vec<EndFn>) -> Self {
        Self { ends }
    }

    /// Guard with nothing to run.
    pub fn noop() -> Self {
        Self { ends: Vec::new() }
    }

    /// Number of pending end functions.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Run every end function, last set up first.
    pub fn finish(mut self, err: Option<&(dyn Error + 'static)>) {
        self.run(err);
    }

    /// Finish with the error of `result`, if it is one.
    pub fn finish_result<T, E>(self, result: &Result<T, E>)
    where
        E: Error + 'static,
    {
        match result {
            Ok(_) => self.finish(None),
            Err(e) => self.finish(Some(e)),
        }
    }

    fn run(&mut self, err: Option<&(dyn Error + 'static)>) {
        while let Some(end) = self.ends.pop() {
            end(err);
        }
    }
}

impl Drop for InterceptGuard {
    fn drop(&mut self) {
        self.run(None);
    }
}

impl fmt::Debug for InterceptGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptGuard")
            .field("pending", &self.ends.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;
    use std::sync::{Arc, Mutex};

    fn recording_end(log: &Arc<Mutex<Vec<String>>>, label: &str) -> EndFn {
        let log = Arc::clone(log);
        let label = label.to_string();
        end_fn(move |err| {
            let suffix = if err.is_some() { ":err" } else { "" };
            log.lock().unwrap().push(format!("{}{}", label, suffix));
        })
    }

    #[test]
    fn test_guard_runs_ends_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let guard = InterceptGuard::new(vec![
            recording_end(&log, "a"),
            recording_end(&log, "b"),
            recording_end(&log, "c"),
        ]);
        assert_eq!(guard.len(), 3);
        guard.finish(None);
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_guard_passes_error_to_every_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let guard = InterceptGuard::new(vec![recording_end(&log, "a"), recording_end(&log, "b")]);
        let result: Result<(), ContextError> = Err(ContextError::Canceled);
        guard.finish_result(&result);
        assert_eq!(*log.lock().unwrap(), vec!["b:err", "a:err"]);
    }

    #[test]
    fn test_dropped_guard_finishes_without_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let _guard = InterceptGuard::new(vec![recording_end(&log, "a")]);
        }
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_noop_guard() {
        let guard = InterceptGuard::noop();
        assert!(guard.is_empty());
        let err = ContextError::DeadlineExceeded;
        guard.finish(Some(&err as &(dyn Error + 'static)));
        InterceptGuard::noop().finish(None);
    }
}
