use std::fmt;

/// Errors raised while turning a declared query and its arguments into a
/// bound statement. None of them touch the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidTemplate {
        reason: String,
    },
    UnknownParameter {
        query: String,
        param: String,
    },
    MissingArgument {
        query: String,
        param: String,
    },
    UnexpectedArgument {
        query: String,
        param: String,
    },
    ArityMismatch {
        param: String,
        expected: &'static str,
        got: &'static str,
    },
    NullArgument {
        param: String,
    },
    EmptyList {
        param: String,
    },
    TooManyArguments {
        count: usize,
        max_bound_args: usize,
    },
    DuplicateParameter {
        param: String,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidTemplate { reason } => write!(f, "invalid query template: {reason}"),
            QueryError::UnknownParameter { query, param } => {
                write!(f, "query '{query}' declares parameter '{param}' not used by its template")
            }
            QueryError::MissingArgument { query, param } => {
                write!(f, "query '{query}' is missing an argument for '{param}'")
            }
            QueryError::UnexpectedArgument { query, param } => {
                write!(f, "query '{query}' has no parameter named '{param}'")
            }
            QueryError::ArityMismatch {
                param,
                expected,
                got,
            } => write!(
                f,
                "parameter '{param}' expects a {expected} argument, got a {got}"
            ),
            QueryError::NullArgument { param } => {
                write!(f, "parameter '{param}' does not accept null")
            }
            QueryError::EmptyList { param } => {
                write!(f, "parameter '{param}' was bound to an empty list")
            }
            QueryError::TooManyArguments {
                count,
                max_bound_args,
            } => write!(
                f,
                "statement binds {count} arguments, max_bound_args={max_bound_args}"
            ),
            QueryError::DuplicateParameter { param } => {
                write!(f, "parameter '{param}' declared twice")
            }
        }
    }
}

impl std::error::Error for QueryError {}

impl QueryError {
    /// True for errors caused by the arguments of one call rather than by the
    /// query declaration.
    pub fn is_malformed_argument(&self) -> bool {
        matches!(
            self,
            QueryError::MissingArgument { .. }
                | QueryError::UnexpectedArgument { .. }
                | QueryError::ArityMismatch { .. }
                | QueryError::NullArgument { .. }
                | QueryError::EmptyList { .. }
                | QueryError::TooManyArguments { .. }
        )
    }
}
