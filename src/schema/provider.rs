//! SchemaProvider trait definition.

use async_trait::async_trait;

use super::types::TableMetadata;
use crate::error::ExecResult;
use crate::value::RowSet;

/// Source of table metadata and column aggregates.
///
/// Implementations read the live schema; they do no caching of their own.
/// The metadata and statistics caches sit on top of this trait.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Names of every user table, sorted.
    async fn list_tables(&self) -> ExecResult<Vec<String>>;

    /// Columns, keys and indices of `table`, without a row count.
    ///
    /// Returns `NotFound` when the table does not exist.
    async fn get_table(&self, table: &str) -> ExecResult<TableMetadata>;

    /// Number of rows in `table`.
    async fn count_rows(&self, table: &str) -> ExecResult<i64>;

    /// Run a single-row aggregate query.
    async fn aggregate(&self, sql: &str) -> ExecResult<RowSet>;
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
