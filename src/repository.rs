use crate::catalog::types::Value;
use crate::error::QbError;
use crate::query::cursor::RowView;
use crate::query::error::QueryError;
use compact_str::CompactString;

/// Converts the row a cursor is positioned on into a domain object.
pub trait TryFromRow: Sized {
    fn try_from_row(row: RowView<'_>) -> Result<Self, RowDecodeError>;
}

/// Typed extraction of one cell.
pub trait FromValue: Sized {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDecodeError {
    #[error("missing column '{column}' at index {index}")]
    MissingColumn { column: String, index: usize },
    #[error("no column named '{column}'")]
    UnknownColumn { column: String },
    #[error("column '{column}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("column '{column}' value out of range for {target}")]
    OutOfRange {
        column: String,
        target: &'static str,
    },
    #[error("{message}")]
    Custom { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DaoError {
    #[error(transparent)]
    Store(#[from] QbError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Decode(#[from] RowDecodeError),
}

impl FromValue for i64 {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Integer(v) => Ok(*v),
            other => Err(mismatch(column, "Integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        let wide = i64::from_value(value, column)?;
        i32::try_from(wide).map_err(|_| RowDecodeError::OutOfRange {
            column: column.to_string(),
            target: "i32",
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            other => Err(mismatch(column, "Float", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Integer(v) => Ok(*v != 0),
            other => Err(mismatch(column, "Integer", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Text(v) => Ok(v.to_string()),
            other => Err(mismatch(column, "Text", other)),
        }
    }
}

impl FromValue for CompactString {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch(column, "Text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Blob(v) => Ok(v.clone()),
            other => Err(mismatch(column, "Blob", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value, column: &str) -> Result<Self, RowDecodeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other, column).map(Some),
        }
    }
}

pub fn value_at<T: FromValue>(
    row: &RowView<'_>,
    index: usize,
    column: &str,
) -> Result<T, RowDecodeError> {
    match row.values().get(index) {
        Some(value) => T::from_value(value, column),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

pub fn text_at<'a>(
    row: &RowView<'a>,
    index: usize,
    column: &str,
) -> Result<&'a str, RowDecodeError> {
    match row.values().get(index) {
        Some(Value::Text(v)) => Ok(v.as_str()),
        Some(other) => Err(mismatch(column, "Text", other)),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

pub fn opt_text_at<'a>(
    row: &RowView<'a>,
    index: usize,
    column: &str,
) -> Result<Option<&'a str>, RowDecodeError> {
    match row.values().get(index) {
        Some(Value::Null) => Ok(None),
        Some(_) => text_at(row, index, column).map(Some),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

pub fn i64_at(row: &RowView<'_>, index: usize, column: &str) -> Result<i64, RowDecodeError> {
    value_at(row, index, column)
}

pub fn opt_i64_at(
    row: &RowView<'_>,
    index: usize,
    column: &str,
) -> Result<Option<i64>, RowDecodeError> {
    value_at(row, index, column)
}

pub fn f64_at(row: &RowView<'_>, index: usize, column: &str) -> Result<f64, RowDecodeError> {
    value_at(row, index, column)
}

pub fn bool_at(row: &RowView<'_>, index: usize, column: &str) -> Result<bool, RowDecodeError> {
    value_at(row, index, column)
}

pub fn blob_at<'a>(
    row: &RowView<'a>,
    index: usize,
    column: &str,
) -> Result<&'a [u8], RowDecodeError> {
    match row.values().get(index) {
        Some(Value::Blob(v)) => Ok(v.as_slice()),
        Some(other) => Err(mismatch(column, "Blob", other)),
        None => Err(RowDecodeError::MissingColumn {
            column: column.to_string(),
            index,
        }),
    }
}

fn mismatch(column: &str, expected: &'static str, actual: &Value) -> RowDecodeError {
    RowDecodeError::TypeMismatch {
        column: column.to_string(),
        expected,
        actual: actual.kind(),
    }
}
