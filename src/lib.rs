// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gantry - request contexts and interceptors for service code.
//!
//! Business methods receive a [`Context`] carrying their collaborators
//! (logger, tracer, meter, database executor) and wrap themselves with
//! [`Context::use_intercept`], which applies the registered cross-cutting
//! interceptors (tracing, logging, metrics, or your own) in order and
//! unwinds them in reverse when the call finishes.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`context`] - Immutable request context, cancellation, and the context factory
//! - [`intercept`] - Interceptor trait, registry, per-call options, and built-ins
//! - [`telemetry`] - Logger, tracer and meter interfaces with `tracing`-backed adapters
//! - [`database`] - Executor and transaction interfaces with a SQLite adapter
//! - [`cache`] - Byte cache interface with an in-memory TTL/LRU adapter
//! - [`config`] - Configuration loading, merging, key access and hot reload
//! - [`app`] - Application composition root and lifecycle hooks
//! - [`attribute`] - Key/value attributes shared by logs, spans and metrics
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use gantry::config::AppConfig;
//! use gantry::{intercept_parts, Application};
//!
//! let app = Application::builder(AppConfig::default()).build()?;
//! let ctx = app.context();
//!
//! let (ctx, guard) = ctx.use_intercept(intercept_parts!["Users", "Get"]);
//! let result = load_user(&ctx, 42);
//! guard.finish_result(&result);
//! ```

pub mod app;
pub mod attribute;
pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod intercept;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use app::{Application, ApplicationBuilder, FnHook, LifecycleHook};
pub use attribute::{AttributeValue, KeyValue};
pub use context::{CancelHandle, Context, ContextBuilder, ContextFactory};
pub use error::{
    CacheError, ConfigError, ContextError, DatabaseError, InterceptError, LifecycleError,
    MetricsError, Result,
};
pub use intercept::{
    join_path, with_additional, with_exclude, with_only, EndFn, InterceptGuard, InterceptPart,
    Interceptor, InterceptorRegistry,
};

/// Gantry version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        // Verify key types are accessible
        let ctx = Context::background();
        let (_ctx, guard) = ctx.use_intercept(intercept_parts!["Svc", "Method"]);
        assert!(guard.is_empty());
        guard.finish(None);
        assert_eq!(join_path(intercept_parts!["a", "b"]).0, "a.b");
    }
}
