//! Per-column statistics cache.
//!
//! Statistics are computed with one aggregate query chosen by the column's
//! [`ColumnKind`]. Text columns also sample their most frequent values; that
//! query is optional and its failure only loses the sample.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::table_key;
use super::SchemaMetadataCache;
use crate::error::{ExecError, ExecResult};
use crate::schema::{quote_ident, ColumnDescriptor, ColumnKind};
use crate::value::{RowSet, Value};

/// Number of values kept by the frequent-value sample.
pub const FREQUENT_VALUES_LIMIT: usize = 10;

/// One of a column's most common values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequentValue {
    pub value: String,
    pub frequency: i64,
}

/// Kind-specific part of a [`ColumnStatistic`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnDetails {
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
    },
    Temporal {
        min_date: Option<String>,
        max_date: Option<String>,
    },
    Text {
        /// `None` when sampling was skipped after a failure, `Some(vec![])`
        /// when it ran and found nothing.
        frequent_values: Option<Vec<FrequentValue>>,
    },
    Other,
}

/// Aggregates for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatistic {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub kind: ColumnKind,
    /// Non-null values.
    pub count: i64,
    pub distinct_count: i64,
    pub null_count: i64,
    pub details: ColumnDetails,
    pub fetched_at: DateTime<Utc>,
}

impl ColumnStatistic {
    /// Cache key, `table.column`.
    pub fn key(&self) -> String {
        stat_key(&self.table, &self.column)
    }
}

fn stat_key(table: &str, column: &str) -> String {
    format!("{}.{}", table_key(table), column.trim().to_lowercase())
}

/// TTL cache of [`ColumnStatistic`], keyed by `table.column`.
///
/// Uses the metadata cache for column typing and shares its TTL.
pub struct ColumnStatisticsCache {
    schema: Arc<SchemaMetadataCache>,
    entries: Mutex<HashMap<String, (Arc<ColumnStatistic>, Instant)>>,
}

impl ColumnStatisticsCache {
    pub fn new(schema: Arc<SchemaMetadataCache>) -> Self {
        Self {
            schema,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get statistics for `table.column`.
    ///
    /// Returns `NotFound` when the column is not in the table's metadata.
    pub async fn get_column_statistics(
        &self,
        table: &str,
        column: &str,
        refresh: bool,
    ) -> ExecResult<Arc<ColumnStatistic>> {
        let key = stat_key(table, column);
        let ttl = self.schema.ttl();

        if !refresh {
            let entries = self.entries.lock().await;
            if let Some((stat, loaded_at)) = entries.get(&key) {
                if loaded_at.elapsed() < ttl {
                    debug!(column = %key, "column statistics cache hit");
                    return Ok(Arc::clone(stat));
                }
            }
        }

        let metadata = self.schema.get_table_metadata(table, false).await?;
        let descriptor = metadata
            .column(column)
            .ok_or_else(|| ExecError::column_not_found(&metadata.name, column))?;

        let stat = Arc::new(self.compute(&metadata.name, descriptor).await?);
        self.entries
            .lock()
            .await
            .insert(key, (Arc::clone(&stat), Instant::now()));
        Ok(stat)
    }

    async fn compute(&self, table: &str, column: &ColumnDescriptor) -> ExecResult<ColumnStatistic> {
        let provider = self.schema.provider();
        let sql = aggregate_sql(table, column);
        let row = provider.aggregate(&sql).await?;

        let details = match column.kind {
            ColumnKind::Integer | ColumnKind::Float | ColumnKind::Decimal => ColumnDetails::Numeric {
                min: float(&row, "min_value"),
                max: float(&row, "max_value"),
                avg: float(&row, "avg_value"),
            },
            ColumnKind::Date | ColumnKind::Time | ColumnKind::Timestamp => ColumnDetails::Temporal {
                min_date: text(&row, "min_value"),
                max_date: text(&row, "max_value"),
            },
            ColumnKind::Text => {
                let frequent_values = match provider.aggregate(&frequent_values_sql(table, &column.name)).await {
                    Ok(rows) => Some(frequent_values(&rows)),
                    Err(err) => {
                        warn!(
                            table = %table,
                            column = %column.name,
                            error = %err,
                            "skipping frequent value sampling"
                        );
                        None
                    }
                };
                ColumnDetails::Text { frequent_values }
            }
            ColumnKind::Boolean | ColumnKind::Binary | ColumnKind::Other => ColumnDetails::Other,
        };

        Ok(ColumnStatistic {
            table: table.to_string(),
            column: column.name.clone(),
            data_type: column.data_type.clone(),
            kind: column.kind,
            count: int(&row, "count"),
            distinct_count: int(&row, "distinct_count"),
            null_count: int(&row, "null_count"),
            details,
            fetched_at: Utc::now(),
        })
    }

    /// Drop every cached column of `table`.
    pub async fn invalidate(&self, table: &str) {
        let prefix = format!("{}.", table_key(table));
        self.entries.lock().await.retain(|key, _| !key.starts_with(&prefix));
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

/// The single aggregate query for a column.
pub(crate) fn aggregate_sql(table: &str, column: &ColumnDescriptor) -> String {
    let col = quote_ident(&column.name);
    let mut select = format!(
        "COUNT({col}) AS count, COUNT(DISTINCT {col}) AS distinct_count, \
         SUM(CASE WHEN {col} IS NULL THEN 1 ELSE 0 END) AS null_count"
    );

    match column.kind {
        ColumnKind::Integer | ColumnKind::Float | ColumnKind::Decimal => {
            // Decimals are stored as text; compare them as numbers.
            select.push_str(&format!(
                ", MIN(CAST({col} AS REAL)) AS min_value, MAX(CAST({col} AS REAL)) AS max_value, \
                 AVG(CAST({col} AS REAL)) AS avg_value"
            ));
        }
        ColumnKind::Date | ColumnKind::Time | ColumnKind::Timestamp => {
            select.push_str(&format!(", MIN({col}) AS min_value, MAX({col}) AS max_value"));
        }
        ColumnKind::Text | ColumnKind::Boolean | ColumnKind::Binary | ColumnKind::Other => {}
    }

    format!("SELECT {} FROM {}", select, quote_ident(table))
}

pub(crate) fn frequent_values_sql(table: &str, column: &str) -> String {
    let col = quote_ident(column);
    format!(
        "SELECT {col} AS value, COUNT(*) AS frequency FROM {} WHERE {col} IS NOT NULL \
         GROUP BY {col} ORDER BY frequency DESC, value LIMIT {}",
        quote_ident(table),
        FREQUENT_VALUES_LIMIT
    )
}

fn frequent_values(rows: &RowSet) -> Vec<FrequentValue> {
    (0..rows.len())
        .map(|r| FrequentValue {
            value: rows.get(r, "value").map(Value::to_text).unwrap_or_default(),
            frequency: rows.get(r, "frequency").and_then(Value::as_i64).unwrap_or(0),
        })
        .collect()
}

fn int(row: &RowSet, column: &str) -> i64 {
    row.get(0, column).and_then(Value::as_i64).unwrap_or(0)
}

fn float(row: &RowSet, column: &str) -> Option<f64> {
    row.get(0, column).and_then(Value::as_f64)
}

fn text(row: &RowSet, column: &str) -> Option<String> {
    row.get(0, column).filter(|v| !v.is_null()).map(Value::to_text)
}
