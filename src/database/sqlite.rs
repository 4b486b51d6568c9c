// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite adapter over an r2d2 connection pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::{Database, Executor, Row, Transaction, UnitOfWork, Value};
use crate::context::Context;
use crate::error::DatabaseError;

type Conn = PooledConnection<SqliteConnectionManager>;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
            Value::Blob(v) => ToSqlOutput::from(v.as_slice()),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

fn exec_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(params_from_iter(params.iter()))?)
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(Value::from(row.get_ref(i)?));
        }
        out.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(out)
}

/// Pool and connection settings.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,

    /// Maximum pooled connections. In-memory databases always use one.
    pub max_connections: u32,

    /// How long SQLite waits on a locked database.
    pub busy_timeout: Duration,

    /// How long to wait for a free pooled connection.
    pub connection_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl SqliteOptions {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// [`Database`] backed by SQLite.
///
/// Each statement borrows a pooled connection. A transaction pins one
/// connection until it finishes; nested transactions are savepoints on it.
pub struct SqliteDatabase {
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
    path: Option<PathBuf>,
}

impl SqliteDatabase {
    /// Open (or create) a database and build its connection pool.
    pub fn open(options: SqliteOptions) -> Result<Self, DatabaseError> {
        let start = Instant::now();
        let busy_timeout = options.busy_timeout;

        let (manager, max_size) = match &options.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::Pool(format!("failed to create database directory: {}", e))
                    })?;
                }
                let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
                    conn.execute_batch(
                        "PRAGMA journal_mode = WAL;
                         PRAGMA synchronous = NORMAL;
                         PRAGMA foreign_keys = ON;",
                    )?;
                    conn.busy_timeout(busy_timeout)
                });
                (manager, options.max_connections.max(1))
            }
            None => {
                let manager = SqliteConnectionManager::memory().with_init(move |conn| {
                    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                    conn.busy_timeout(busy_timeout)
                });
                (manager, 1)
            }
        };

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(options.connection_timeout)
            .build(manager)?;

        tracing::debug!(
            path = ?options.path,
            max_size,
            elapsed = ?start.elapsed(),
            "sqlite pool ready"
        );

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            path: options.path,
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::open(SqliteOptions::memory())
    }

    /// Database file path, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `(connections, idle)` currently held by the pool.
    pub fn pool_state(&self) -> Option<(u32, u32)> {
        self.pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|pool| {
                let state = pool.state();
                (state.connections, state.idle_connections)
            })
    }

    fn conn(&self) -> Result<Conn, DatabaseError> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| DatabaseError::Pool("database is closed".to_string()))?;
        Ok(pool.get()?)
    }
}

impl Executor for SqliteDatabase {
    fn exec(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<usize, DatabaseError> {
        ctx.check()?;
        exec_on(&*self.conn()?, sql, params)
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        ctx.check()?;
        query_on(&*self.conn()?, sql, params)
    }

    fn as_unit_of_work(&self) -> Option<&dyn UnitOfWork> {
        Some(self)
    }
}

impl UnitOfWork for SqliteDatabase {
    fn begin(&self, ctx: &Context) -> Result<Arc<dyn Transaction>, DatabaseError> {
        ctx.check()?;
        let conn = self.conn()?;
        conn.execute_batch("BEGIN")?;
        Ok(Arc::new(SqliteTransaction {
            shared: Arc::new(TxShared {
                conn: Mutex::new(Some(conn)),
                next_savepoint: AtomicU32::new(0),
            }),
            savepoint: None,
            finished: AtomicBool::new(false),
        }))
    }
}

impl Database for SqliteDatabase {
    fn health_check(&self, ctx: &Context) -> Result<(), DatabaseError> {
        ctx.check()?;
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn close(&self) -> Result<(), DatabaseError> {
        self.pool
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|_| ())
            .ok_or_else(|| DatabaseError::Pool("database is closed".to_string()))
    }
}

/// Connection pinned by a top-level transaction and its savepoints.
struct TxShared {
    conn: Mutex<Option<Conn>>,
    next_savepoint: AtomicU32,
}

/// A SQLite transaction, or a savepoint inside one.
pub struct SqliteTransaction {
    shared: Arc<TxShared>,
    savepoint: Option<String>,
    finished: AtomicBool,
}

impl SqliteTransaction {
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        if self.finished.load(Ordering::Acquire) {
            return Err(DatabaseError::TransactionFinished);
        }
        let guard = self.shared.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_ref().ok_or(DatabaseError::TransactionFinished)?;
        f(conn)
    }

    fn finish(&self, sql: &str) -> Result<(), DatabaseError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(DatabaseError::TransactionFinished);
        }
        let mut guard = self.shared.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_ref().ok_or(DatabaseError::TransactionFinished)?;
        let result = conn.execute_batch(sql).map_err(DatabaseError::from);
        if result.is_err() {
            self.abort(conn);
        }
        if self.savepoint.is_none() {
            // Return the connection to the pool.
            guard.take();
        }
        result
    }

    /// Undo work left open by a failed COMMIT or RELEASE, such as a deferred
    /// constraint violation, so the connection is clean again.
    fn abort(&self, conn: &Connection) {
        if conn.is_autocommit() {
            return;
        }
        let sql = match &self.savepoint {
            Some(name) => format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"),
            None => "ROLLBACK".to_string(),
        };
        if let Err(e) = conn.execute_batch(&sql) {
            tracing::warn!(
                error = %e,
                savepoint = self.savepoint.as_deref(),
                "rollback after failed finish failed"
            );
        }
    }

    /// Savepoint name, `None` for the outermost transaction.
    pub fn savepoint(&self) -> Option<&str> {
        self.savepoint.as_deref()
    }
}

impl Executor for SqliteTransaction {
    fn exec(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<usize, DatabaseError> {
        ctx.check()?;
        self.with_conn(|conn| exec_on(conn, sql, params))
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        ctx.check()?;
        self.with_conn(|conn| query_on(conn, sql, params))
    }

    fn as_unit_of_work(&self) -> Option<&dyn UnitOfWork> {
        Some(self)
    }
}

impl UnitOfWork for SqliteTransaction {
    fn begin(&self, ctx: &Context) -> Result<Arc<dyn Transaction>, DatabaseError> {
        ctx.check()?;
        let n = self.shared.next_savepoint.fetch_add(1, Ordering::Relaxed);
        let name = format!("sp_{}", n);
        self.with_conn(|conn| Ok(conn.execute_batch(&format!("SAVEPOINT {}", name))?))?;
        Ok(Arc::new(SqliteTransaction {
            shared: Arc::clone(&self.shared),
            savepoint: Some(name),
            finished: AtomicBool::new(false),
        }))
    }
}

impl Transaction for SqliteTransaction {
    fn commit(&self) -> Result<(), DatabaseError> {
        match &self.savepoint {
            Some(name) => self.finish(&format!("RELEASE SAVEPOINT {}", name)),
            None => self.finish("COMMIT"),
        }
    }

    fn rollback(&self) -> Result<(), DatabaseError> {
        match &self.savepoint {
            Some(name) => self.finish(&format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
            )),
            None => self.finish("ROLLBACK"),
        }
    }

    fn into_executor(self: Arc<Self>) -> Arc<dyn Executor> {
        self
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Acquire) {
            if let Err(e) = self.rollback() {
                tracing::warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(db: &SqliteDatabase, ctx: &Context) {
        db.exec(
            ctx,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            &[],
        )
        .unwrap();
    }

    fn count(db: &SqliteDatabase, ctx: &Context) -> i64 {
        db.query_one(ctx, "SELECT COUNT(*) AS n FROM users", &[])
            .unwrap()
            .unwrap()
            .get_i64("n")
            .unwrap()
    }

    #[test]
    fn test_exec_and_query() {
        let ctx = Context::background();
        let db = SqliteDatabase::in_memory().unwrap();
        setup(&db, &ctx);

        let affected = db
            .exec(&ctx, "INSERT INTO users (name) VALUES (?1)", &[Value::from("ada")])
            .unwrap();
        assert_eq!(affected, 1);

        let rows = db.query(&ctx, "SELECT id, name FROM users", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name").unwrap(), "ada");
        assert_eq!(rows[0].columns(), &["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_file_database_and_health_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.db");
        let db = SqliteDatabase::open(SqliteOptions::file(&path).with_max_connections(2)).unwrap();
        let ctx = Context::background();

        db.health_check(&ctx).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[test]
    fn test_close_rejects_later_calls() {
        let ctx = Context::background();
        let db = SqliteDatabase::in_memory().unwrap();
        db.close().unwrap();
        assert!(matches!(db.health_check(&ctx), Err(DatabaseError::Pool(_))));
        assert!(db.close().is_err());
    }

    #[test]
    fn test_cancelled_context_is_rejected() {
        let db = SqliteDatabase::in_memory().unwrap();
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();
        assert!(matches!(
            db.exec(&ctx, "SELECT 1", &[]),
            Err(DatabaseError::Cancelled(_))
        ));
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let ctx = Context::background();
        let db = SqliteDatabase::in_memory().unwrap();
        setup(&db, &ctx);

        let tx = db.begin(&ctx).unwrap();
        tx.exec(&ctx, "INSERT INTO users (name) VALUES ('a')", &[]).unwrap();
        tx.rollback().unwrap();
        assert!(matches!(tx.commit(), Err(DatabaseError::TransactionFinished)));
        drop(tx);
        assert_eq!(count(&db, &ctx), 0);

        let tx = db.begin(&ctx).unwrap();
        tx.exec(&ctx, "INSERT INTO users (name) VALUES ('b')", &[]).unwrap();
        tx.commit().unwrap();
        drop(tx);
        assert_eq!(count(&db, &ctx), 1);
    }

    #[test]
    fn test_savepoint_rollback_keeps_outer_work() {
        let ctx = Context::background();
        let db = SqliteDatabase::in_memory().unwrap();
        setup(&db, &ctx);

        let outer = db.begin(&ctx).unwrap();
        outer.exec(&ctx, "INSERT INTO users (name) VALUES ('outer')", &[]).unwrap();

        let inner = outer.begin(&ctx).unwrap();
        inner.exec(&ctx, "INSERT INTO users (name) VALUES ('inner')", &[]).unwrap();
        inner.rollback().unwrap();

        outer.commit().unwrap();
        drop(inner);
        drop(outer);

        let rows = db.query(&ctx, "SELECT name FROM users", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name").unwrap(), "outer");
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let ctx = Context::background();
        let db = SqliteDatabase::in_memory().unwrap();
        setup(&db, &ctx);

        {
            let tx = db.begin(&ctx).unwrap();
            tx.exec(&ctx, "INSERT INTO users (name) VALUES ('gone')", &[]).unwrap();
        }
        assert_eq!(count(&db, &ctx), 0);
    }
}
