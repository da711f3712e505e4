//! Query execution with timeout and bounded retry.
//!
//! [`QueryExecutor`] runs single statements and transactions against pooled
//! connections. [`QueryExecutor::execute_sql`] is the upstream-facing wrapper
//! that caps rows, times the call and formats the result.

mod executor;

pub use executor::{ensure_limit, QueryExecutor};
pub(crate) use executor::LIMIT_CLAUSE;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ErrorInfo, ExecError};
use crate::format::{FormatOptions, FormatType, FormattedOutput, SummaryStats};
use crate::value::{RowSet, Value};

/// How a statement's result is materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Every row.
    #[default]
    All,
    /// The first row, if any.
    One,
    /// The first column of the first row.
    Scalar,
    /// Only the affected-row count.
    Status,
}

impl FromStr for FetchMode {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(FetchMode::All),
            "one" => Ok(FetchMode::One),
            "scalar" => Ok(FetchMode::Scalar),
            "status" => Ok(FetchMode::Status),
            other => Err(ExecError::InvalidArgument(format!(
                "invalid fetch mode '{}', expected all, one, scalar or status",
                other
            ))),
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchMode::All => "all",
            FetchMode::One => "one",
            FetchMode::Scalar => "scalar",
            FetchMode::Status => "status",
        };
        f.write_str(name)
    }
}

/// Result of [`QueryExecutor::execute`], shaped by the fetch mode.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(RowSet),
    /// At most one row; empty when the statement returned nothing.
    Row(RowSet),
    /// `Value::Null` when the statement returned no rows.
    Scalar(Value),
    Status(u64),
}

impl QueryOutput {
    /// Flatten into a row set. Scalars and statuses become a one-cell table.
    pub fn into_row_set(self) -> RowSet {
        match self {
            QueryOutput::Rows(rows) | QueryOutput::Row(rows) => rows,
            QueryOutput::Scalar(value) => RowSet::with_rows(vec!["value".into()], vec![vec![value]]),
            QueryOutput::Status(count) => RowSet::with_rows(
                vec!["rows_affected".into()],
                vec![vec![Value::Int(count as i64)]],
            ),
        }
    }

    pub fn scalar(&self) -> Option<&Value> {
        match self {
            QueryOutput::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

/// One statement of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

/// Per-call options for [`QueryExecutor::execute_sql`].
#[derive(Debug, Clone, Default)]
pub struct SqlOptions {
    /// Row cap; falls back to `services.execution.max_rows`.
    pub max_rows: Option<usize>,
    pub format: FormatType,
    pub include_summary: bool,
    /// Statement deadline; falls back to `services.execution.timeout`.
    pub timeout: Option<std::time::Duration>,
    pub format_options: FormatOptions,
}

/// Structured result of a single statement.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<FormattedOutput>,
    pub error: Option<ErrorInfo>,
    /// Wall-clock seconds.
    pub execution_time: f64,
    pub row_count: usize,
    pub truncated: bool,
    /// The statement as executed, including any appended `LIMIT`.
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryStats>,
}

/// Structured result of a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub success: bool,
    pub error: Option<ErrorInfo>,
    pub execution_time: f64,
    pub statement_count: usize,
}
