//! Per-table metadata cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::table_key;
use crate::error::{ErrorInfo, ExecResult};
use crate::schema::{SchemaProvider, TableMetadata};

/// Access counters for one cached table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableUsage {
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

/// Outcome of a bulk refresh or preload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub tables_refreshed: usize,
    pub errors: Vec<RefreshError>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A table that failed to refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshError {
    pub table: String,
    pub error: ErrorInfo,
}

struct CacheEntry {
    metadata: Arc<TableMetadata>,
    loaded_at: Instant,
    usage: TableUsage,
}

/// TTL cache of [`TableMetadata`], one entry per table.
pub struct SchemaMetadataCache {
    provider: Arc<dyn SchemaProvider>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    loading: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaMetadataCache {
    pub fn new(provider: Arc<dyn SchemaProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: Mutex::new(HashMap::new()),
            loading: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn provider(&self) -> &Arc<dyn SchemaProvider> {
        &self.provider
    }

    /// Get metadata for `table`, introspecting on a miss, after expiry, or
    /// when `refresh` is set.
    ///
    /// A hit bumps the table's usage counters and does not touch the database.
    /// Loads of one table are serialized: callers that miss together share
    /// one introspection, and snapshots are published in load order.
    pub async fn get_table_metadata(
        &self,
        table: &str,
        refresh: bool,
    ) -> ExecResult<Arc<TableMetadata>> {
        let key = table_key(table);
        let requested = Instant::now();

        if !refresh {
            if let Some(hit) = self.hit(&key, None).await {
                return Ok(hit);
            }
            debug!(table = %key, "metadata cache miss");
        }

        let gate = self.gate(&key).await;
        let _loading = gate.lock().await;

        // Someone else may have loaded it while we waited; a refresh only
        // accepts a load that began after it was requested.
        let newer_than = refresh.then_some(requested);
        if let Some(hit) = self.hit(&key, newer_than).await {
            return Ok(hit);
        }

        // Introspect without holding the entries lock.
        let started = Instant::now();
        let metadata = Arc::new(self.load(table).await?);

        let mut entries = self.entries.lock().await;
        let access_count = entries.get(&key).map_or(0, |e| e.usage.access_count) + 1;
        entries.insert(
            key,
            CacheEntry {
                metadata: Arc::clone(&metadata),
                loaded_at: started,
                usage: TableUsage {
                    access_count,
                    last_accessed: Utc::now(),
                },
            },
        );
        Ok(metadata)
    }

    /// A fresh entry, counted as an access. With `newer_than`, only an entry
    /// whose load began strictly after that instant qualifies.
    async fn hit(&self, key: &str, newer_than: Option<Instant>) -> Option<Arc<TableMetadata>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(key)?;
        if entry.loaded_at.elapsed() >= self.ttl {
            debug!(table = %key, "metadata cache entry expired");
            return None;
        }
        if newer_than.is_some_and(|t| entry.loaded_at <= t) {
            return None;
        }
        entry.usage.access_count += 1;
        entry.usage.last_accessed = Utc::now();
        debug!(table = %key, "metadata cache hit");
        Some(Arc::clone(&entry.metadata))
    }

    /// The per-table lock held while a table is being introspected.
    async fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        let mut loading = self.loading.lock().await;
        Arc::clone(loading.entry(key.to_string()).or_default())
    }

    async fn load(&self, table: &str) -> ExecResult<TableMetadata> {
        let mut metadata = self.provider.get_table(table).await?;

        metadata.row_count_estimate = match self.provider.count_rows(&metadata.name).await {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(table = %metadata.name, error = %err, "row count probe failed");
                None
            }
        };
        metadata.fetched_at = Utc::now();
        Ok(metadata)
    }

    /// Refresh every table in the live schema.
    ///
    /// Per-table failures are collected in the report; only failing to list
    /// the tables is an error.
    pub async fn refresh_all(&self) -> ExecResult<RefreshReport> {
        let tables = self.provider.list_tables().await?;
        let report = self.load_many(&tables, true).await;
        info!(
            refreshed = report.tables_refreshed,
            failed = report.errors.len(),
            "schema cache refreshed"
        );
        Ok(report)
    }

    /// Warm the cache with `tables`. Best effort; failures are reported.
    pub async fn preload(&self, tables: &[String]) -> RefreshReport {
        let report = self.load_many(tables, false).await;
        if !report.is_complete() {
            warn!(failed = report.errors.len(), "some tables failed to preload");
        }
        report
    }

    async fn load_many(&self, tables: &[String], refresh: bool) -> RefreshReport {
        let results = join_all(
            tables
                .iter()
                .map(|table| async move { (table, self.get_table_metadata(table, refresh).await) }),
        )
        .await;

        let mut report = RefreshReport::default();
        for (table, result) in results {
            match result {
                Ok(_) => report.tables_refreshed += 1,
                Err(err) => {
                    warn!(table = %table, error = %err, "table refresh failed");
                    report.errors.push(RefreshError {
                        table: table.clone(),
                        error: err.to_info(),
                    });
                }
            }
        }
        report
    }

    /// Cached metadata if present and fresh, without counting an access.
    pub async fn peek(&self, table: &str) -> Option<Arc<TableMetadata>> {
        let entries = self.entries.lock().await;
        entries
            .get(&table_key(table))
            .filter(|e| e.loaded_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.metadata))
    }

    pub async fn usage(&self, table: &str) -> Option<TableUsage> {
        self.entries.lock().await.get(&table_key(table)).map(|e| e.usage)
    }

    /// Drop one table. Returns whether it was cached.
    pub async fn invalidate(&self, table: &str) -> bool {
        let key = table_key(table);
        self.loading.lock().await.remove(&key);
        self.entries.lock().await.remove(&key).is_some()
    }

    pub async fn clear(&self) {
        self.loading.lock().await.clear();
        self.entries.lock().await.clear();
    }

    /// Keys of every cached table, sorted.
    pub async fn cached_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        tables.sort();
        tables
    }

    /// Live table names, uncached.
    pub async fn list_tables(&self) -> ExecResult<Vec<String>> {
        self.provider.list_tables().await
    }
}
