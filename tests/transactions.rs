// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transactions through `with_transaction` on a SQLite file database.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tempfile::TempDir;

use gantry::database::{with_transaction, Database, Executor, SqliteDatabase, SqliteOptions, Value};
use gantry::{Context, DatabaseError};

fn setup() -> (TempDir, Arc<SqliteDatabase>, Context) {
    let temp = TempDir::new().unwrap();
    let db = Arc::new(
        SqliteDatabase::open(SqliteOptions::file(temp.path().join("app.db"))).unwrap(),
    );
    let ctx = Context::background().with_db(db.clone());
    ctx.db()
        .exec(
            &ctx,
            "CREATE TABLE accounts (name TEXT PRIMARY KEY, balance INTEGER NOT NULL)",
            &[],
        )
        .unwrap();
    (temp, db, ctx)
}

fn insert(ctx: &Context, name: &str, balance: i64) -> Result<usize, DatabaseError> {
    ctx.db().exec(
        ctx,
        "INSERT INTO accounts (name, balance) VALUES (?1, ?2)",
        &[Value::from(name), Value::from(balance)],
    )
}

fn names(ctx: &Context) -> Vec<String> {
    ctx.db()
        .query(ctx, "SELECT name FROM accounts ORDER BY name", &[])
        .unwrap()
        .iter()
        .map(|row| row.get_str("name").unwrap().to_string())
        .collect()
}

#[test]
fn test_commit_on_ok() {
    let (_temp, _db, ctx) = setup();
    let result: Result<(), DatabaseError> = with_transaction(&ctx, |tx| {
        insert(tx, "alice", 10)?;
        insert(tx, "bob", 20)?;
        Ok(())
    });
    assert!(result.is_ok());
    assert_eq!(names(&ctx), vec!["alice", "bob"]);
}

#[test]
fn test_rollback_on_err() {
    let (_temp, _db, ctx) = setup();
    let result: Result<(), DatabaseError> = with_transaction(&ctx, |tx| {
        insert(tx, "alice", 10)?;
        // Duplicate key fails the whole unit of work.
        insert(tx, "alice", 30)?;
        Ok(())
    });
    assert!(matches!(result, Err(DatabaseError::Sql(_))));
    assert!(names(&ctx).is_empty());
}

#[test]
fn test_rollback_on_panic_then_resume() {
    let (_temp, _db, ctx) = setup();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), DatabaseError> = with_transaction(&ctx, |tx| {
            insert(tx, "alice", 10)?;
            panic!("boom");
        });
    }));
    assert!(outcome.is_err());
    assert!(names(&ctx).is_empty());
}

#[test]
fn test_inner_failure_keeps_outer_work() {
    let (_temp, _db, ctx) = setup();
    let result: Result<(), DatabaseError> = with_transaction(&ctx, |outer| {
        insert(outer, "alice", 10)?;

        let inner: Result<(), DatabaseError> = with_transaction(outer, |inner| {
            insert(inner, "bob", 20)?;
            Err(DatabaseError::TransactionFinished)
        });
        assert!(inner.is_err());

        let committed: Result<(), DatabaseError> = with_transaction(outer, |inner| {
            insert(inner, "carol", 30)?;
            Ok(())
        });
        assert!(committed.is_ok());
        Ok(())
    });

    assert!(result.is_ok());
    assert_eq!(names(&ctx), vec!["alice", "carol"]);
}

#[test]
fn test_outer_failure_discards_committed_savepoint() {
    let (_temp, _db, ctx) = setup();
    let result: Result<(), DatabaseError> = with_transaction(&ctx, |outer| {
        with_transaction(outer, |inner| insert(inner, "bob", 20).map(|_| ()))?;
        Err(DatabaseError::TransactionFinished)
    });
    assert!(result.is_err());
    assert!(names(&ctx).is_empty());
}

#[test]
fn test_failed_commit_rolls_back_and_frees_connection() {
    // One pooled connection, so the next transaction reuses the failed one.
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let ctx = Context::background().with_db(db.clone());
    for sql in [
        "CREATE TABLE parent (id INTEGER PRIMARY KEY)",
        "CREATE TABLE child (id INTEGER PRIMARY KEY, \
         pid INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED)",
    ] {
        ctx.db().exec(&ctx, sql, &[]).unwrap();
    }
    let count = |table: &str| {
        ctx.db()
            .query_one(&ctx, &format!("SELECT COUNT(*) AS n FROM {table}"), &[])
            .unwrap()
            .unwrap()
            .get_i64("n")
            .unwrap()
    };

    // The orphan only fails at COMMIT.
    let result: Result<(), DatabaseError> = with_transaction(&ctx, |tx| {
        tx.db()
            .exec(tx, "INSERT INTO child (id, pid) VALUES (1, 99)", &[])
            .map(|_| ())
    });
    assert!(matches!(result, Err(DatabaseError::Sql(_))));
    assert_eq!(count("child"), 0);

    let next: Result<(), DatabaseError> = with_transaction(&ctx, |tx| {
        tx.db().exec(tx, "INSERT INTO parent (id) VALUES (99)", &[])?;
        tx.db()
            .exec(tx, "INSERT INTO child (id, pid) VALUES (1, 99)", &[])
            .map(|_| ())
    });
    assert!(next.is_ok());
    assert_eq!(count("child"), 1);
    assert!(db.health_check(&ctx).is_ok());
}

#[test]
fn test_transaction_context_leaves_original_untouched() {
    let (_temp, _db, ctx) = setup();
    let _: Result<(), DatabaseError> = with_transaction(&ctx, |tx| {
        assert!(!Context::ptr_eq(&ctx, tx));
        assert!(tx.db().as_unit_of_work().is_some());
        Ok(())
    });
}

#[test]
fn test_cancelled_context_rejects_work() {
    let (_temp, db, ctx) = setup();
    let (cancelled, handle) = ctx.with_cancel();
    handle.cancel();
    assert!(matches!(
        insert(&cancelled, "alice", 1),
        Err(DatabaseError::Cancelled(_))
    ));
    assert!(db.health_check(&ctx).is_ok());
}

#[test]
fn test_without_unit_of_work() {
    let ctx = Context::background();
    let result: Result<(), DatabaseError> = with_transaction(&ctx, |_| Ok(()));
    assert!(matches!(result, Err(DatabaseError::NoAdapter)));
}
