// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Database access through the request context.
//!
//! Business code talks to an [`Executor`] taken from
//! [`Context::db`](crate::context::Context::db). Inside
//! [`with_transaction`] that executor is the open transaction, so the same
//! code runs with or without one.

mod sqlite;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::attribute;
use crate::context::Context;
use crate::error::DatabaseError;

pub use sqlite::{SqliteDatabase, SqliteOptions};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Result<&Value, DatabaseError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| DatabaseError::ColumnNotFound(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, DatabaseError> {
        match self.get(column)? {
            Value::Integer(v) => Ok(*v),
            _ => Err(mismatch(column, "an integer")),
        }
    }

    /// Real column; integers are widened.
    pub fn get_f64(&self, column: &str) -> Result<f64, DatabaseError> {
        match self.get(column)? {
            Value::Real(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            _ => Err(mismatch(column, "a number")),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<&str, DatabaseError> {
        match self.get(column)? {
            Value::Text(v) => Ok(v),
            _ => Err(mismatch(column, "text")),
        }
    }

    pub fn get_bytes(&self, column: &str) -> Result<&[u8], DatabaseError> {
        match self.get(column)? {
            Value::Blob(v) => Ok(v),
            _ => Err(mismatch(column, "a blob")),
        }
    }

    pub fn is_null(&self, column: &str) -> Result<bool, DatabaseError> {
        Ok(matches!(self.get(column)?, Value::Null))
    }
}

fn mismatch(column: &str, expected: &'static str) -> DatabaseError {
    DatabaseError::TypeMismatch {
        column: column.to_string(),
        expected,
    }
}

/// Runs statements.
///
/// Both methods fail with [`DatabaseError::Cancelled`] when the context is
/// already cancelled or past its deadline.
pub trait Executor: Send + Sync {
    /// Run a statement and return the number of affected rows.
    fn exec(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<usize, DatabaseError>;

    /// Run a query and collect every row.
    fn query(&self, ctx: &Context, sql: &str, params: &[Value])
        -> Result<Vec<Row>, DatabaseError>;

    /// Run a query and return its first row, if any.
    fn query_one(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, DatabaseError> {
        Ok(self.query(ctx, sql, params)?.into_iter().next())
    }

    /// Transaction support, when this executor has it.
    fn as_unit_of_work(&self) -> Option<&dyn UnitOfWork> {
        None
    }
}

/// Starts transactions.
pub trait UnitOfWork: Send + Sync {
    /// Begin a transaction. On a transaction this opens a savepoint.
    fn begin(&self, ctx: &Context) -> Result<Arc<dyn Transaction>, DatabaseError>;
}

/// An open transaction.
///
/// Dropping an unfinished transaction rolls it back.
pub trait Transaction: Executor + UnitOfWork {
    fn commit(&self) -> Result<(), DatabaseError>;

    fn rollback(&self) -> Result<(), DatabaseError>;

    /// View this transaction as a plain executor for a context.
    fn into_executor(self: Arc<Self>) -> Arc<dyn Executor>;
}

/// A database handle: executor, transaction source, and lifecycle.
pub trait Database: Executor + UnitOfWork {
    /// Verify the database answers a trivial query.
    fn health_check(&self, ctx: &Context) -> Result<(), DatabaseError>;

    /// Release pooled resources. Later calls fail.
    fn close(&self) -> Result<(), DatabaseError>;
}

/// Run `f` inside a transaction on the context's executor.
///
/// `f` receives a context whose [`db`](Context::db) is the transaction. The
/// transaction commits when `f` returns `Ok`, and rolls back when it returns
/// `Err` or panics; the panic is then resumed. Calling this again inside `f`
/// opens a savepoint, so an inner failure leaves outer work intact.
pub fn with_transaction<T, E, F>(ctx: &Context, f: F) -> Result<T, E>
where
    F: FnOnce(&Context) -> Result<T, E>,
    E: From<DatabaseError>,
{
    let db = ctx.db();
    let uow = db
        .as_unit_of_work()
        .ok_or(DatabaseError::TransactionsUnsupported)?;
    let tx = uow.begin(ctx)?;
    let tx_ctx = ctx.with_db(Arc::clone(&tx).into_executor());

    match panic::catch_unwind(AssertUnwindSafe(|| f(&tx_ctx))) {
        Ok(Ok(value)) => match tx.commit() {
            Ok(()) => Ok(value),
            Err(commit_err) => {
                rollback_logged(ctx, tx.as_ref());
                Err(commit_err.into())
            }
        },
        Ok(Err(err)) => {
            rollback_logged(ctx, tx.as_ref());
            Err(err)
        }
        Err(payload) => {
            rollback_logged(ctx, tx.as_ref());
            panic::resume_unwind(payload)
        }
    }
}

/// Roll back, logging failures. An already finished transaction is fine:
/// adapters undo a failed commit themselves.
fn rollback_logged(ctx: &Context, tx: &dyn Transaction) {
    match tx.rollback() {
        Ok(()) | Err(DatabaseError::TransactionFinished) => {}
        Err(err) => ctx.logger().warn(
            "transaction rollback failed",
            &[attribute::string("error", err.to_string())],
        ),
    }
}

/// Database that has no backend. Every operation returns
/// [`DatabaseError::NoAdapter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDatabase;

impl Executor for NoopDatabase {
    fn exec(&self, _: &Context, _: &str, _: &[Value]) -> Result<usize, DatabaseError> {
        Err(DatabaseError::NoAdapter)
    }

    fn query(&self, _: &Context, _: &str, _: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        Err(DatabaseError::NoAdapter)
    }

    fn as_unit_of_work(&self) -> Option<&dyn UnitOfWork> {
        Some(self)
    }
}

impl UnitOfWork for NoopDatabase {
    fn begin(&self, _: &Context) -> Result<Arc<dyn Transaction>, DatabaseError> {
        Err(DatabaseError::NoAdapter)
    }
}

impl Database for NoopDatabase {
    fn health_check(&self, _: &Context) -> Result<(), DatabaseError> {
        Err(DatabaseError::NoAdapter)
    }

    fn close(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
