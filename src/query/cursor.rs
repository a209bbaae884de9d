use crate::catalog::types::{Row, Value};
use crate::error::QbError;
use crate::repository::RowDecodeError;
use compact_str::CompactString;

/// A stateful, single-owner iterator over the rows of one query.
///
/// A fresh cursor is positioned before the first row. Once closed, every read
/// fails with [`QbError::CursorClosed`].
pub trait Cursor {
    fn count(&self) -> usize;
    fn column_names(&self) -> &[CompactString];
    fn position(&self) -> Option<usize>;
    fn move_to_first(&mut self) -> Result<bool, QbError>;
    fn move_to_next(&mut self) -> Result<bool, QbError>;
    fn row(&self) -> Result<RowView<'_>, QbError>;
    fn close(&mut self);
    fn is_closed(&self) -> bool;

    fn value(&self, column: usize) -> Result<&Value, QbError> {
        let row = self.row()?;
        let column_count = row.values().len();
        row.values()
            .get(column)
            .ok_or(QbError::ColumnOutOfRange {
                index: column,
                column_count,
            })
    }

    fn is_null(&self, column: usize) -> Result<bool, QbError> {
        self.value(column).map(Value::is_null)
    }
}

/// Borrowed view of the row a cursor is positioned on.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [CompactString],
    row: &'a Row,
}

impl<'a> RowView<'a> {
    pub fn new(columns: &'a [CompactString], row: &'a Row) -> Self {
        Self { columns, row }
    }

    pub fn values(&self) -> &'a [Value] {
        &self.row.values
    }

    pub fn columns(&self) -> &'a [CompactString] {
        self.columns
    }

    /// Column lookup by name, case-insensitive like SQLite result columns.
    pub fn index_of(&self, column: &str) -> Result<usize, RowDecodeError> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .ok_or_else(|| RowDecodeError::UnknownColumn {
                column: column.to_string(),
            })
    }
}

/// Cursor over rows already fetched from the store.
#[derive(Debug, Clone, Default)]
pub struct RowsCursor {
    columns: Vec<CompactString>,
    rows: Vec<Row>,
    // None: before first row; Some(len): past the last row
    position: Option<usize>,
    closed: bool,
}

impl RowsCursor {
    pub fn new(columns: Vec<CompactString>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            position: None,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), QbError> {
        if self.closed {
            return Err(QbError::CursorClosed);
        }
        Ok(())
    }
}

impl Cursor for RowsCursor {
    fn count(&self) -> usize {
        self.rows.len()
    }

    fn column_names(&self) -> &[CompactString] {
        &self.columns
    }

    fn position(&self) -> Option<usize> {
        self.position.filter(|p| *p < self.rows.len())
    }

    fn move_to_first(&mut self) -> Result<bool, QbError> {
        self.ensure_open()?;
        self.position = Some(0);
        Ok(!self.rows.is_empty())
    }

    fn move_to_next(&mut self) -> Result<bool, QbError> {
        self.ensure_open()?;
        let next = match self.position {
            None => 0,
            Some(p) if p >= self.rows.len() => return Ok(false),
            Some(p) => p + 1,
        };
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn row(&self) -> Result<RowView<'_>, QbError> {
        self.ensure_open()?;
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or(QbError::CursorNotPositioned)?;
        Ok(RowView::new(&self.columns, row))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rows.clear();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
