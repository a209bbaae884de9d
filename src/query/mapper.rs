use crate::query::cursor::Cursor;
use crate::repository::{DaoError, FromValue, TryFromRow};
use std::marker::PhantomData;

/// Turns a freshly opened cursor into the typed result of one query.
pub trait RowMapper: Send + Sync {
    type Output: Send + Sync + 'static;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError>;
}

/// First row converted to `T`; no row yields `None`.
pub struct FirstRow<T>(PhantomData<fn() -> T>);

/// Every row converted to `T`, in cursor order.
pub struct AllRows<T>(PhantomData<fn() -> T>);

/// One column of the first row. `None` means the query returned no rows; it is
/// never conflated with a stored zero.
pub struct Scalar<T> {
    column: usize,
    _marker: PhantomData<fn() -> T>,
}

/// One column of the first row, or `T::default()` when there are no rows.
pub struct ScalarOrDefault<T> {
    column: usize,
    _marker: PhantomData<fn() -> T>,
}

/// One column of every row. A null cell is a decode error.
pub struct ScalarList<T> {
    column: usize,
    _marker: PhantomData<fn() -> T>,
}

/// One column of every row, null cells kept as `None`.
pub struct NullableScalarList<T> {
    column: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FirstRow<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FirstRow<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AllRows<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for AllRows<T> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! column_mapper_ctor {
    ($($ty:ident),+) => {
        $(
            impl<T> $ty<T> {
                pub fn column(column: usize) -> Self {
                    Self {
                        column,
                        _marker: PhantomData,
                    }
                }

                pub fn first_column() -> Self {
                    Self::column(0)
                }
            }
        )+
    };
}

column_mapper_ctor!(Scalar, ScalarOrDefault, ScalarList, NullableScalarList);

impl<T> RowMapper for FirstRow<T>
where
    T: TryFromRow + Send + Sync + 'static,
{
    type Output = Option<T>;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError> {
        if !cursor.move_to_first()? {
            return Ok(None);
        }
        Ok(Some(T::try_from_row(cursor.row()?)?))
    }
}

impl<T> RowMapper for AllRows<T>
where
    T: TryFromRow + Send + Sync + 'static,
{
    type Output = Vec<T>;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError> {
        let mut out = Vec::with_capacity(cursor.count());
        while cursor.move_to_next()? {
            out.push(T::try_from_row(cursor.row()?)?);
        }
        Ok(out)
    }
}

impl<T> RowMapper for Scalar<T>
where
    T: FromValue + Send + Sync + 'static,
{
    type Output = Option<T>;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError> {
        if !cursor.move_to_first()? {
            return Ok(None);
        }
        Ok(Some(read_column(cursor, self.column)?))
    }
}

impl<T> RowMapper for ScalarOrDefault<T>
where
    T: FromValue + Default + Send + Sync + 'static,
{
    type Output = T;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError> {
        if !cursor.move_to_first()? {
            return Ok(T::default());
        }
        read_column(cursor, self.column)
    }
}

impl<T> RowMapper for ScalarList<T>
where
    T: FromValue + Send + Sync + 'static,
{
    type Output = Vec<T>;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError> {
        let mut out = Vec::with_capacity(cursor.count());
        while cursor.move_to_next()? {
            out.push(read_column(cursor, self.column)?);
        }
        Ok(out)
    }
}

impl<T> RowMapper for NullableScalarList<T>
where
    T: FromValue + Send + Sync + 'static,
{
    type Output = Vec<Option<T>>;

    fn map(&self, cursor: &mut dyn Cursor) -> Result<Self::Output, DaoError> {
        let mut out = Vec::with_capacity(cursor.count());
        while cursor.move_to_next()? {
            if cursor.is_null(self.column)? {
                out.push(None);
            } else {
                out.push(Some(read_column(cursor, self.column)?));
            }
        }
        Ok(out)
    }
}

fn read_column<T: FromValue>(cursor: &dyn Cursor, column: usize) -> Result<T, DaoError> {
    let value = cursor.value(column)?;
    let name = cursor
        .column_names()
        .get(column)
        .map(|c| c.as_str())
        .unwrap_or("?");
    Ok(T::from_value(value, name)?)
}
