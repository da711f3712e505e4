//! Schema introspection for SQLite.
//!
//! Reads `sqlite_master` and the `pragma_*` table-valued functions through
//! the [`QueryExecutor`], so introspection shares the pool and retry policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::provider::{quote_ident, SchemaProvider};
use super::types::{ColumnDescriptor, ForeignKeyRef, IndexDescriptor, TableMetadata};
use crate::error::{ExecError, ExecResult};
use crate::execution::{FetchMode, QueryExecutor};
use crate::value::{RowSet, Value};

const LIST_TABLES: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
const RESOLVE_TABLE: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name = ?1 COLLATE NOCASE";
const TABLE_INFO: &str = "SELECT * FROM pragma_table_info(?1) ORDER BY cid";
const PRIMARY_KEY: &str = "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk";
const FOREIGN_KEYS: &str = "SELECT * FROM pragma_foreign_key_list(?1) ORDER BY id, seq";
const INDEX_LIST: &str = "SELECT * FROM pragma_index_list(?1)";
const INDEX_INFO: &str = "SELECT name FROM pragma_index_info(?1) ORDER BY seqno";

/// [`SchemaProvider`] backed by a SQLite database.
pub struct SqliteSchemaProvider {
    executor: Arc<QueryExecutor>,
}

impl SqliteSchemaProvider {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }

    async fn rows(&self, sql: &str, params: &[Value]) -> ExecResult<RowSet> {
        Ok(self
            .executor
            .execute(sql, params, None, FetchMode::All)
            .await?
            .into_row_set())
    }

    /// Canonical spelling of `table`, or `NotFound`.
    async fn resolve(&self, table: &str) -> ExecResult<String> {
        let rows = self.rows(RESOLVE_TABLE, &[Value::from(table)]).await?;
        rows.get(0, "name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ExecError::table_not_found(table))
    }

    async fn columns(&self, table: &str) -> ExecResult<(Vec<ColumnDescriptor>, Vec<String>)> {
        let info = self.rows(TABLE_INFO, &[Value::from(table)]).await?;

        let mut columns = Vec::with_capacity(info.len());
        let mut keyed: Vec<(i64, String)> = Vec::new();
        for row in 0..info.len() {
            let name = text(&info, row, "name");
            let mut column = ColumnDescriptor::new(name.clone(), text(&info, row, "type"));
            column.nullable = int(&info, row, "notnull") == 0;
            column.default = info
                .get(row, "dflt_value")
                .filter(|v| !v.is_null())
                .map(Value::to_text);

            let pk_position = int(&info, row, "pk");
            if pk_position > 0 {
                column.is_primary_key = true;
                column.nullable = false;
                keyed.push((pk_position, name));
            }
            columns.push(column);
        }

        keyed.sort();
        let primary_keys: Vec<String> = keyed.into_iter().map(|(_, name)| name).collect();

        // A lone INTEGER PRIMARY KEY aliases the rowid.
        if let [only] = primary_keys.as_slice() {
            if let Some(column) = columns.iter_mut().find(|c| &c.name == only) {
                column.is_autoincrement = column.data_type.eq_ignore_ascii_case("integer");
            }
        }

        Ok((columns, primary_keys))
    }

    async fn foreign_keys(&self, table: &str) -> ExecResult<Vec<ForeignKeyRef>> {
        let rows = self.rows(FOREIGN_KEYS, &[Value::from(table)]).await?;

        let mut grouped: BTreeMap<i64, ForeignKeyRef> = BTreeMap::new();
        for row in 0..rows.len() {
            let id = int(&rows, row, "id");
            let fk = grouped.entry(id).or_insert_with(|| ForeignKeyRef {
                name: format!("fk_{}_{}", table, id),
                referred_table: text(&rows, row, "table"),
                local_columns: Vec::new(),
                referred_columns: Vec::new(),
            });
            fk.local_columns.push(text(&rows, row, "from"));
            if let Some(to) = rows.get(row, "to").and_then(Value::as_str) {
                fk.referred_columns.push(to.to_string());
            }
        }

        let mut fks: Vec<ForeignKeyRef> = grouped.into_values().collect();
        for fk in &mut fks {
            // `REFERENCES t` without columns targets the primary key.
            if fk.referred_columns.len() != fk.local_columns.len() {
                let pk = self.rows(PRIMARY_KEY, &[Value::from(fk.referred_table.as_str())]).await?;
                fk.referred_columns = (0..pk.len()).map(|r| text(&pk, r, "name")).collect();
            }
        }
        Ok(fks)
    }

    async fn indices(&self, table: &str) -> ExecResult<Vec<IndexDescriptor>> {
        let list = self.rows(INDEX_LIST, &[Value::from(table)]).await?;

        let mut indices = Vec::with_capacity(list.len());
        for row in 0..list.len() {
            let name = text(&list, row, "name");
            let info = self.rows(INDEX_INFO, &[Value::from(name.as_str())]).await?;
            // Expression index members have no column name.
            let columns = (0..info.len())
                .filter_map(|r| info.get(r, "name").and_then(Value::as_str).map(str::to_string))
                .collect();
            indices.push(IndexDescriptor {
                name,
                unique: int(&list, row, "unique") != 0,
                columns,
            });
        }
        Ok(indices)
    }
}

#[async_trait]
impl SchemaProvider for SqliteSchemaProvider {
    async fn list_tables(&self) -> ExecResult<Vec<String>> {
        let rows = self.rows(LIST_TABLES, &[]).await?;
        Ok((0..rows.len()).map(|r| text(&rows, r, "name")).collect())
    }

    async fn get_table(&self, table: &str) -> ExecResult<TableMetadata> {
        let name = self.resolve(table).await?;
        let (columns, primary_keys) = self.columns(&name).await?;
        let foreign_keys = self.foreign_keys(&name).await?;
        let indices = self.indices(&name).await?;

        debug!(
            table = %name,
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            indices = indices.len(),
            "introspected table"
        );

        let mut metadata = TableMetadata::new(name);
        metadata.columns = columns;
        metadata.primary_keys = primary_keys;
        metadata.foreign_keys = foreign_keys;
        metadata.indices = indices;
        Ok(metadata)
    }

    async fn count_rows(&self, table: &str) -> ExecResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let output = self
            .executor
            .execute(&sql, &[], None, FetchMode::Scalar)
            .await?;
        output
            .scalar()
            .and_then(Value::as_i64)
            .ok_or_else(|| ExecError::transient(format!("row count for '{}' was not an integer", table)))
    }

    async fn aggregate(&self, sql: &str) -> ExecResult<RowSet> {
        self.rows(sql, &[]).await
    }
}

fn text(rows: &RowSet, row: usize, column: &str) -> String {
    rows.get(row, column).map(Value::to_text).unwrap_or_default()
}

fn int(rows: &RowSet, row: usize, column: &str) -> i64 {
    rows.get(row, column).and_then(Value::as_i64).unwrap_or(0)
}
