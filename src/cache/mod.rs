//! In-memory TTL caches over the live schema.
//!
//! - [`SchemaMetadataCache`]: per-table [`TableMetadata`](crate::schema::TableMetadata)
//!   snapshots with usage counters.
//! - [`ColumnStatisticsCache`]: per-column aggregates keyed by `table.column`.
//!
//! Both caches publish immutable `Arc` snapshots. A refresh builds a new
//! snapshot with the lock released and swaps it in afterwards, so readers
//! never see a half-built entry and a slow refresh does not block hits on
//! other keys. Nothing is persisted; a restart starts cold.

mod column_stats;
mod schema_cache;

pub use column_stats::{ColumnDetails, ColumnStatistic, ColumnStatisticsCache, FrequentValue};
pub use schema_cache::{RefreshError, RefreshReport, SchemaMetadataCache, TableUsage};

/// Cache key for a table name.
fn table_key(table: &str) -> String {
    table.trim().to_lowercase()
}
