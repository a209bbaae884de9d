use crate::catalog::normalize_table_name;
use crate::catalog::types::{Row, Value};
use crate::config::DatabaseConfig;
use crate::error::QbError;
use crate::query::cursor::{Cursor, RowsCursor};
use crate::query::statement::BoundStatement;
use crate::storage::{RowStore, WriteResult};
use compact_str::CompactString;
use parking_lot::Mutex;
use rusqlite::hooks::Action;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params_from_iter};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// [`RowStore`] over a single SQLite connection.
///
/// Result rows are fetched eagerly into a [`RowsCursor`], so the connection
/// lock is never held while a caller maps rows. Changed tables are collected
/// through SQLite's update hook.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changed: Arc<Mutex<BTreeSet<String>>>,
}

impl SqliteStore {
    pub fn open(path: &Path, config: &DatabaseConfig) -> Result<Self, QbError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "sqlite store opened");
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory(config: &DatabaseConfig) -> Result<Self, QbError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: &DatabaseConfig) -> Result<Self, QbError> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            config.journal_mode.as_pragma(),
            |row| row.get(0),
        )?;
        debug!(journal_mode = %mode, "sqlite journal mode set");

        let changed = Arc::new(Mutex::new(BTreeSet::new()));
        let sink = Arc::clone(&changed);
        conn.update_hook(Some(
            move |_action: Action, _db: &str, table: &str, _rowid: i64| {
                sink.lock().insert(normalize_table_name(table));
            },
        ));

        Ok(Self {
            conn: Mutex::new(conn),
            changed,
        })
    }

    fn take_changed(&self) -> BTreeSet<String> {
        std::mem::take(&mut *self.changed.lock())
    }
}

impl RowStore for SqliteStore {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn Cursor>, QbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Vec<CompactString> = stmt
            .column_names()
            .into_iter()
            .map(CompactString::from)
            .collect();
        let column_count = columns.len();

        let mut rows = stmt.query(params_from_iter(args.iter().map(to_sql_value)))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(value_from_ref(row.get_ref(index)?));
            }
            fetched.push(Row::from_values(values));
        }
        Ok(Box::new(RowsCursor::new(columns, fetched)))
    }

    fn execute(&self, statements: &[BoundStatement]) -> Result<WriteResult, QbError> {
        let mut conn = self.conn.lock();
        self.take_changed();

        let tx = conn.transaction()?;
        let mut rows_affected = 0;
        for statement in statements {
            let mut prepared = tx.prepare_cached(&statement.sql)?;
            rows_affected +=
                prepared.execute(params_from_iter(statement.args.iter().map(to_sql_value)))?;
        }
        let last_insert_rowid = tx.last_insert_rowid();
        tx.commit()?;

        Ok(WriteResult {
            rows_affected,
            last_insert_rowid,
            changed_tables: self.take_changed(),
        })
    }

    fn execute_script(&self, sql: &str) -> Result<BTreeSet<String>, QbError> {
        let conn = self.conn.lock();
        self.take_changed();
        conn.execute_batch(sql)?;
        Ok(self.take_changed())
    }

    fn table_names(&self) -> Result<BTreeSet<String>, QbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = BTreeSet::new();
        for name in names {
            out.insert(normalize_table_name(&name?));
        }
        Ok(out)
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(v) => rusqlite::types::Value::Integer(*v),
        Value::Float(v) => rusqlite::types::Value::Real(*v),
        Value::Text(v) => rusqlite::types::Value::Text(v.to_string()),
        Value::Blob(v) => rusqlite::types::Value::Blob(v.clone()),
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        // text that is not UTF-8 keeps its bytes
        ValueRef::Text(text) => match std::str::from_utf8(text) {
            Ok(text) => Value::Text(CompactString::from(text)),
            Err(_) => Value::Blob(text.to_vec()),
        },
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}
