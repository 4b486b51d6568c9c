// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logger interface and its `tracing` adapter.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::attribute::{self, KeyValue};
use crate::context::Context;

/// A structured log field.
pub type Field = KeyValue;

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// Lowercase name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Structured logging.
///
/// Implementations must be safe to share across threads. `with` returns a
/// child logger; the receiver is left untouched.
pub trait Logger: Send + Sync {
    /// Emit one record.
    fn log(&self, level: Level, msg: &str, fields: &[Field]);

    /// Child logger that adds `fields` to every record.
    fn with(&self, fields: &[Field]) -> Arc<dyn Logger>;

    /// Optional capability: enrich this logger from a [`Context`].
    fn as_context_aware(&self) -> Option<&dyn ContextAwareLogger> {
        None
    }

    fn debug(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Debug, msg, fields);
    }

    fn info(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Info, msg, fields);
    }

    fn warn(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Warn, msg, fields);
    }

    fn error(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Error, msg, fields);
    }

    /// Log at fatal level. Adapters may terminate the process.
    fn fatal(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Fatal, msg, fields);
    }
}

/// A logger that can bind request-scoped data (trace and span ids) from a
/// context.
pub trait ContextAwareLogger: Send + Sync {
    fn with_context(&self, ctx: &Context) -> Arc<dyn Logger>;
}

macro_rules! emit {
    ($macro:ident, $msg:expr, $fields:expr) => {
        if $fields.is_empty() {
            tracing::$macro!("{}", $msg)
        } else {
            tracing::$macro!(fields = %$fields, "{}", $msg)
        }
    };
}

/// [`Logger`] backed by `tracing` events.
///
/// Records go to whatever subscriber [`init_telemetry`](super::init_telemetry)
/// installed. Fields are rendered as `key=value` pairs.
#[derive(Clone)]
pub struct TracingLogger {
    fields: Arc<[Field]>,
    exit_on_fatal: bool,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self {
            fields: Arc::from(Vec::new()),
            exit_on_fatal: true,
        }
    }

    /// Keep the process alive on `fatal`.
    pub fn without_exit(mut self) -> Self {
        self.exit_on_fatal = false;
        self
    }

    /// Fields bound to this logger.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn merged(&self, extra: &[Field]) -> Vec<Field> {
        let mut all = Vec::with_capacity(self.fields.len() + extra.len());
        all.extend(self.fields.iter().cloned());
        all.extend(extra.iter().cloned());
        all
    }

    fn child(&self, fields: Vec<Field>) -> Self {
        Self {
            fields: Arc::from(fields),
            exit_on_fatal: self.exit_on_fatal,
        }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, msg: &str, fields: &[Field]) {
        let mut all = self.merged(fields);
        if level == Level::Fatal {
            all.push(attribute::boolean("fatal", true));
        }
        let rendered = attribute::render(&all);

        match level {
            Level::Debug => emit!(debug, msg, rendered),
            Level::Info => emit!(info, msg, rendered),
            Level::Warn => emit!(warn, msg, rendered),
            Level::Error => emit!(error, msg, rendered),
            Level::Fatal => {
                emit!(error, msg, rendered);
                if self.exit_on_fatal {
                    std::process::exit(1);
                }
            }
        }
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Logger> {
        Arc::new(self.child(self.merged(fields)))
    }

    fn as_context_aware(&self) -> Option<&dyn ContextAwareLogger> {
        Some(self)
    }
}

impl ContextAwareLogger for TracingLogger {
    fn with_context(&self, ctx: &Context) -> Arc<dyn Logger> {
        let sc = ctx.span().span_context();
        if !sc.is_valid() {
            return Arc::new(self.clone());
        }

        let mut fields: Vec<Field> = self
            .fields
            .iter()
            .filter(|f| &*f.key != "trace_id" && &*f.key != "span_id")
            .cloned()
            .collect();
        fields.push(attribute::string("trace_id", sc.trace_id().to_string()));
        fields.push(attribute::string("span_id", sc.span_id().to_string()));
        Arc::new(self.child(fields))
    }
}

/// Logger that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _msg: &str, _fields: &[Field]) {}

    fn with(&self, _fields: &[Field]) -> Arc<dyn Logger> {
        Arc::new(NoopLogger)
    }
}

/// A captured log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
}

impl Record {
    /// Look up a field value by key, rendered as a string.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields
            .iter()
            .rev()
            .find(|f| &*f.key == key)
            .map(|f| f.value.to_string())
    }
}

/// Logger that keeps every record in memory.
///
/// Children created with `with` share the same record buffer.
#[derive(Clone, Default)]
pub struct MemoryLogger {
    fields: Vec<Field>,
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record captured so far.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Records at the given level.
    pub fn records_at(&self, level: Level) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, msg: &str, fields: &[Field]) {
        let mut all = self.fields.clone();
        all.extend(fields.iter().cloned());
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Record {
                level,
                message: msg.to_string(),
                fields: all,
            });
    }

    fn with(&self, fields: &[Field]) -> Arc<dyn Logger> {
        let mut all = self.fields.clone();
        all.extend(fields.iter().cloned());
        Arc::new(Self {
            fields: all,
            records: Arc::clone(&self.records),
        })
    }
}
