pub mod cursor;
pub mod error;
pub mod executor;
pub mod live;
pub mod mapper;
pub mod statement;

pub use cursor::{Cursor, RowView, RowsCursor};
pub use error::QueryError;
pub use live::{LiveQuery, LiveQueryWatcher, LiveState};
pub use mapper::{AllRows, FirstRow, NullableScalarList, RowMapper, Scalar, ScalarList, ScalarOrDefault};
pub use statement::{Args, Arity, BoundStatement, ParamSpec, QueryTemplate};
