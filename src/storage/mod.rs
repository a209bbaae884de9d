pub mod sqlite;

use crate::catalog::types::Value;
use crate::error::QbError;
use crate::query::cursor::Cursor;
use crate::query::statement::BoundStatement;
use std::collections::BTreeSet;

/// The row-oriented store a database runs its statements against.
///
/// Cursors returned by [`RowStore::query`] are owned by the caller and are
/// used from a single thread; the store itself is shared.
pub trait RowStore: Send + Sync {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Cursor>, QbError>;

    /// Runs all statements in one transaction. Either every statement commits
    /// or none does.
    fn execute(&self, statements: &[BoundStatement]) -> Result<WriteResult, QbError>;

    /// Runs argument-free SQL, typically schema DDL. Returns the tables any
    /// data changes in the script touched.
    fn execute_script(&self, sql: &str) -> Result<BTreeSet<String>, QbError>;

    /// Names of the user tables the store currently holds, normalized.
    fn table_names(&self) -> Result<BTreeSet<String>, QbError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub rows_affected: usize,
    /// Row id of the most recent successful insert on the store's connection,
    /// as SQLite reports it.
    pub last_insert_rowid: i64,
    /// Normalized names of tables the committed transaction touched.
    pub changed_tables: BTreeSet<String>,
}
