//! Error taxonomy for the execution layer.
//!
//! Every failure that leaves this crate is one of five kinds. Callers that
//! need structured data (the upstream conversational layer) convert with
//! [`ExecError::to_info`] instead of rendering the `Display` text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for execution-layer operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors produced by the pool, executor, caches and engines.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The pool could not be established or a connection could not be opened.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// A query or transaction exceeded its deadline.
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// What was running when the deadline expired.
        operation: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// Driver or network error; retried by the executor.
    #[error("execution failed: {message}")]
    Transient {
        /// Driver error message.
        message: String,
        /// Fragment of the statement that failed, if known.
        query: Option<String>,
    },

    /// An explicitly requested table or column does not exist.
    #[error("{} not found", describe_missing(.table, .column))]
    NotFound {
        /// Table that was requested.
        table: String,
        /// Column that was requested, if the lookup was column-level.
        column: Option<String>,
    },

    /// Malformed fetch mode, statement list or option.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn describe_missing(table: &str, column: &Option<String>) -> String {
    match column {
        Some(column) => format!("column '{}.{}'", table, column),
        None => format!("table '{}'", table),
    }
}

impl ExecError {
    /// Create a transient error without query context.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            query: None,
        }
    }

    /// Create a table-level not-found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            column: None,
        }
    }

    /// Create a column-level not-found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            column: Some(column.into()),
        }
    }

    /// Attach a query fragment to a transient error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_query(self, sql: &str) -> Self {
        match self {
            Self::Transient { message, query: None } => Self::Transient {
                message,
                query: Some(query_fragment(sql)),
            },
            other => other,
        }
    }

    /// Check if this error should be retried by the executor.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailure(_) => "CONNECTION_FAILURE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Transient { .. } => "EXECUTION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }

    /// Convert into the structured form returned to upstream callers.
    pub fn to_info(&self) -> ErrorInfo {
        let (table, column, query) = match self {
            Self::NotFound { table, column } => (Some(table.clone()), column.clone(), None),
            Self::Transient { query, .. } => (None, None, query.clone()),
            _ => (None, None, None),
        };

        ErrorInfo {
            code: self.code().to_string(),
            message: self.to_string(),
            table,
            column,
            query,
        }
    }
}

impl From<rusqlite::Error> for ExecError {
    fn from(err: rusqlite::Error) -> Self {
        Self::transient(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExecError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::transient(format!("driver task failed: {}", err))
    }
}

/// Structured error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (e.g. `TIMEOUT`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Leading part of a statement, for error context.
pub(crate) fn query_fragment(sql: &str) -> String {
    const MAX: usize = 120;
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX {
        collapsed
    } else {
        let mut fragment: String = collapsed.chars().take(MAX).collect();
        fragment.push_str("...");
        fragment
    }
}
