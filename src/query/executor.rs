use crate::query::cursor::{Cursor, RowsCursor};
use crate::query::mapper::RowMapper;
use crate::query::statement::BoundStatement;
use crate::repository::DaoError;
use crate::storage::{RowStore, WriteResult};
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// Owns a cursor for the duration of one query and closes it when dropped,
/// whichever way the query exits.
pub struct CursorGuard {
    cursor: Box<dyn Cursor>,
}

impl CursorGuard {
    pub fn new(cursor: Box<dyn Cursor>) -> Self {
        Self { cursor }
    }
}

impl Deref for CursorGuard {
    type Target = dyn Cursor;

    fn deref(&self) -> &Self::Target {
        self.cursor.as_ref()
    }
}

impl DerefMut for CursorGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cursor.as_mut()
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

/// Runs one read statement: a single cursor, mapped once, never retried.
pub fn execute_query<M: RowMapper + ?Sized>(
    store: &dyn RowStore,
    statement: &BoundStatement,
    mapper: &M,
) -> Result<M::Output, DaoError> {
    let cursor: Box<dyn Cursor> = if statement.matches_nothing {
        debug!(sql = %statement.sql, "statement matches nothing; store skipped");
        Box::new(RowsCursor::empty())
    } else {
        debug!(sql = %statement.sql, args = statement.args.len(), "executing query");
        store.query(&statement.sql, &statement.args)?
    };
    let mut guard = CursorGuard::new(cursor);
    mapper.map(&mut *guard)
}

/// Runs write statements in one transaction. An empty batch is a no-op.
pub fn execute_write(
    store: &dyn RowStore,
    statements: &[BoundStatement],
) -> Result<WriteResult, DaoError> {
    if statements.is_empty() {
        return Ok(WriteResult::default());
    }
    debug!(statements = statements.len(), "executing write transaction");
    match store.execute(statements) {
        Ok(result) => Ok(result),
        Err(err) => {
            warn!(error = %err, "write transaction rolled back");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{execute_query, execute_write};
    use crate::catalog::types::{Row, Value};
    use crate::error::QbError;
    use crate::query::cursor::{Cursor, RowView, RowsCursor};
    use crate::query::mapper::{AllRows, RowMapper, Scalar};
    use crate::query::statement::BoundStatement;
    use crate::repository::{DaoError, RowDecodeError, TryFromRow, i64_at};
    use crate::storage::{RowStore, WriteResult};
    use compact_str::CompactString;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Cursor that records its close and can fail on a chosen row.
    struct SpyCursor {
        inner: RowsCursor,
        fail_at: Option<usize>,
        steps: usize,
        closes: Arc<AtomicUsize>,
    }

    impl Cursor for SpyCursor {
        fn count(&self) -> usize {
            self.inner.count()
        }
        fn column_names(&self) -> &[CompactString] {
            self.inner.column_names()
        }
        fn position(&self) -> Option<usize> {
            self.inner.position()
        }
        fn move_to_first(&mut self) -> Result<bool, QbError> {
            self.inner.move_to_first()
        }
        fn move_to_next(&mut self) -> Result<bool, QbError> {
            if self.fail_at == Some(self.steps) {
                return Err(QbError::Unavailable {
                    message: "disk I/O error".into(),
                });
            }
            self.steps += 1;
            self.inner.move_to_next()
        }
        fn row(&self) -> Result<RowView<'_>, QbError> {
            self.inner.row()
        }
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close();
        }
        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }

    struct SpyStore {
        rows: Vec<Row>,
        fail_at: Option<usize>,
        queries: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    impl SpyStore {
        fn new(rows: Vec<Row>, fail_at: Option<usize>) -> Self {
            Self {
                rows,
                fail_at,
                queries: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RowStore for SpyStore {
        fn query(&self, _sql: &str, _args: &[Value]) -> Result<Box<dyn Cursor>, QbError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SpyCursor {
                inner: RowsCursor::new(vec!["uid".into()], self.rows.clone()),
                fail_at: self.fail_at,
                steps: 0,
                closes: Arc::clone(&self.closes),
            }))
        }
        fn execute(&self, _statements: &[BoundStatement]) -> Result<WriteResult, QbError> {
            Err(QbError::Unavailable {
                message: "read only".into(),
            })
        }
        fn execute_script(&self, _sql: &str) -> Result<BTreeSet<String>, QbError> {
            Ok(BTreeSet::new())
        }
        fn table_names(&self) -> Result<BTreeSet<String>, QbError> {
            Ok(BTreeSet::from(["user".to_string()]))
        }
    }

    #[derive(Debug)]
    struct Uid(i64);

    impl TryFromRow for Uid {
        fn try_from_row(row: RowView<'_>) -> Result<Self, RowDecodeError> {
            Ok(Self(i64_at(&row, 0, "uid")?))
        }
    }

    #[derive(Debug)]
    struct Strict;

    impl TryFromRow for Strict {
        fn try_from_row(_row: RowView<'_>) -> Result<Self, RowDecodeError> {
            Err(RowDecodeError::Custom {
                message: "rejected".into(),
            })
        }
    }

    fn rows(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| Row::from_values(vec![Value::Integer(i)]))
            .collect()
    }

    fn stmt() -> BoundStatement {
        BoundStatement::new("SELECT uid FROM user", Vec::new())
    }

    #[test]
    fn cursor_is_closed_after_success() {
        let store = SpyStore::new(rows(3), None);
        let out = execute_query(&store, &stmt(), &AllRows::<Uid>::new()).expect("query");
        assert_eq!(out.iter().map(|u| u.0).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cursor_is_closed_after_mapping_error() {
        let store = SpyStore::new(rows(2), None);
        let err = execute_query(&store, &stmt(), &AllRows::<Strict>::new()).expect_err("decode");
        assert!(matches!(err, DaoError::Decode(_)));
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cursor_is_closed_after_store_error_mid_iteration() {
        let store = SpyStore::new(rows(5), Some(2));
        let err = execute_query(&store, &stmt(), &AllRows::<Uid>::new()).expect_err("io");
        assert!(matches!(err, DaoError::Store(QbError::Unavailable { .. })));
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cursor_is_closed_when_mapper_panics() {
        struct Panics;
        impl RowMapper for Panics {
            type Output = ();
            fn map(&self, _cursor: &mut dyn Cursor) -> Result<(), DaoError> {
                panic!("mapper bug");
            }
        }

        let store = SpyStore::new(rows(1), None);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = execute_query(&store, &stmt(), &Panics);
        }));
        assert!(result.is_err());
        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn matches_nothing_skips_the_store() {
        let store = SpyStore::new(rows(3), None);
        let mut statement = stmt();
        statement.matches_nothing = true;
        let out = execute_query(&store, &statement, &Scalar::<i64>::first_column()).expect("query");
        assert_eq!(out, None);
        assert_eq!(store.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn store_write_failure_propagates_unchanged() {
        let store = SpyStore::new(Vec::new(), None);
        let err = execute_write(&store, &[stmt()]).expect_err("read only");
        assert!(matches!(err, DaoError::Store(QbError::Unavailable { .. })));
        assert_eq!(
            execute_write(&store, &[]).expect("empty batch"),
            WriteResult::default()
        );
    }
}
