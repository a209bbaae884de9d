use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Table,
    Observer,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Table => write!(f, "table"),
            ResourceType::Observer => write!(f, "observer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QbErrorCode {
    Store,
    Validation,
    InvalidConfig,
    Unavailable,
    TableNotFound,
    ObserverNotFound,
    CursorClosed,
    CursorNotPositioned,
    ColumnOutOfRange,
}

impl QbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            QbErrorCode::Store => "store",
            QbErrorCode::Validation => "validation",
            QbErrorCode::InvalidConfig => "invalid_config",
            QbErrorCode::Unavailable => "unavailable",
            QbErrorCode::TableNotFound => "table_not_found",
            QbErrorCode::ObserverNotFound => "observer_not_found",
            QbErrorCode::CursorClosed => "cursor_closed",
            QbErrorCode::CursorNotPositioned => "cursor_not_positioned",
            QbErrorCode::ColumnOutOfRange => "column_out_of_range",
        }
    }
}

/// Store-level failures, including misuse of a cursor handed out by a store.
#[derive(Debug, Error)]
pub enum QbError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("resource unavailable: {message}")]
    Unavailable { message: String },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("cursor is closed")]
    CursorClosed,
    #[error("cursor is not positioned on a row")]
    CursorNotPositioned,
    #[error("column index {index} out of range (column_count={column_count})")]
    ColumnOutOfRange { index: usize, column_count: usize },
}

impl QbError {
    pub fn code(&self) -> QbErrorCode {
        match self {
            QbError::Store(_) => QbErrorCode::Store,
            QbError::Validation(_) => QbErrorCode::Validation,
            QbError::InvalidConfig { .. } => QbErrorCode::InvalidConfig,
            QbError::Unavailable { .. } => QbErrorCode::Unavailable,
            QbError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Table => QbErrorCode::TableNotFound,
                ResourceType::Observer => QbErrorCode::ObserverNotFound,
            },
            QbError::CursorClosed => QbErrorCode::CursorClosed,
            QbError::CursorNotPositioned => QbErrorCode::CursorNotPositioned,
            QbError::ColumnOutOfRange { .. } => QbErrorCode::ColumnOutOfRange,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
