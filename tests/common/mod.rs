#![allow(dead_code)]

use compact_str::CompactString;
use querybind::catalog::types::Value;
use querybind::config::DatabaseConfig;
use querybind::error::QbError;
use querybind::query::cursor::{Cursor, RowView};
use querybind::query::statement::BoundStatement;
use querybind::repository::{RowDecodeError, TryFromRow, i64_at, opt_i64_at, text_at};
use querybind::storage::sqlite::SqliteStore;
use querybind::storage::{RowStore, WriteResult};
use querybind::{Args, Database, QuerySpec, WriteKind, WriteMethod};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const SCHEMA: &str = "
    CREATE TABLE user (uid INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);
    CREATE TABLE pet (id INTEGER PRIMARY KEY, owner INTEGER, name TEXT NOT NULL);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: i64,
    pub name: CompactString,
    pub age: Option<i64>,
}

impl TryFromRow for User {
    fn try_from_row(row: RowView<'_>) -> Result<Self, RowDecodeError> {
        Ok(Self {
            uid: i64_at(&row, 0, "uid")?,
            name: text_at(&row, 1, "name")?.into(),
            age: opt_i64_at(&row, 2, "age")?,
        })
    }
}

/// Sqlite store that counts how many read statements reach it.
pub struct CountingStore {
    inner: SqliteStore,
    queries: AtomicUsize,
}

impl CountingStore {
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl RowStore for CountingStore {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Cursor>, QbError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, args)
    }

    fn execute(&self, statements: &[BoundStatement]) -> Result<WriteResult, QbError> {
        self.inner.execute(statements)
    }

    fn execute_script(&self, sql: &str) -> Result<BTreeSet<String>, QbError> {
        self.inner.execute_script(sql)
    }

    fn table_names(&self) -> Result<BTreeSet<String>, QbError> {
        self.inner.table_names()
    }
}

pub fn open_counting(config: DatabaseConfig) -> (Database, Arc<CountingStore>) {
    let store = Arc::new(CountingStore {
        inner: SqliteStore::open_in_memory(&config).expect("open store"),
        queries: AtomicUsize::new(0),
    });
    let db = Database::with_store(config, store.clone()).expect("database");
    db.execute_script(SCHEMA).expect("schema");
    (db, store)
}

pub fn open(config: DatabaseConfig) -> Database {
    open_counting(config).0
}

pub fn insert_user() -> WriteMethod {
    WriteMethod::new(
        QuerySpec::new(
            "insertUser",
            "INSERT INTO user (uid, name, age) VALUES (:uid, :name, :age)",
        )
        .expect("spec")
        .nullable("age"),
        WriteKind::Insert,
    )
    .expect("write method")
}

pub fn seed_users(db: &Database, users: &[(i64, &str, Option<i64>)]) {
    let insert = insert_user();
    for (uid, name, age) in users {
        insert
            .execute(
                db,
                Args::new()
                    .bind("uid", *uid)
                    .bind("name", *name)
                    .bind("age", *age),
            )
            .expect("seed user");
    }
}
