//! The `SqlPilot` facade.
//!
//! Owns the pool manager, executor, caches and engines for one process.
//! Construct it once at startup, share it by reference, and call
//! [`SqlPilot::shutdown`] once at exit.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backend::{Connector, SqliteConnector};
use crate::cache::{ColumnStatistic, ColumnStatisticsCache, RefreshReport, SchemaMetadataCache};
use crate::config::Settings;
use crate::error::ExecResult;
use crate::execution::{
    ExecutionResult, FetchMode, QueryExecutor, QueryOutput, SqlOptions, Statement,
    TransactionResult,
};
use crate::hints::{QueryHintGenerator, QueryHints};
use crate::pool::{PoolManager, PoolStats};
use crate::relationships::{
    GraphEdge, JoinSuggestion, JoinSuggestionEngine, RelationshipDiscovery, RelationshipGraph,
};
use crate::schema::{SchemaProvider, SqliteSchemaProvider, TableMetadata};
use crate::value::Value;

/// Schema-aware SQL execution for one database.
pub struct SqlPilot {
    settings: Settings,
    pools: Arc<PoolManager>,
    executor: Arc<QueryExecutor>,
    schema: Arc<SchemaMetadataCache>,
    column_stats: ColumnStatisticsCache,
    discovery: Arc<RelationshipDiscovery>,
    joins: JoinSuggestionEngine,
    hints: QueryHintGenerator,
}

impl SqlPilot {
    /// Build against the SQLite file named in `settings.database.name`.
    pub async fn start(settings: Settings) -> Self {
        Self::with_connector(settings, Arc::new(SqliteConnector)).await
    }

    /// Build with a custom connector.
    ///
    /// The pool is created on first use. Tables in `preload_tables` are
    /// loaded into the metadata cache before returning; failures are logged.
    pub async fn with_connector(settings: Settings, connector: Arc<dyn Connector>) -> Self {
        let pools = Arc::new(PoolManager::new(connector, settings.database.clone()));
        let executor = Arc::new(QueryExecutor::new(
            Arc::clone(&pools),
            settings.services.execution.clone(),
        ));
        let provider: Arc<dyn SchemaProvider> =
            Arc::new(SqliteSchemaProvider::new(Arc::clone(&executor)));
        let schema = Arc::new(SchemaMetadataCache::new(provider, settings.cache_ttl()));
        let discovery = Arc::new(RelationshipDiscovery::new(Arc::clone(&schema)));

        let pilot = Self {
            column_stats: ColumnStatisticsCache::new(Arc::clone(&schema)),
            joins: JoinSuggestionEngine::new(Arc::clone(&schema), Arc::clone(&discovery)),
            hints: QueryHintGenerator::new(Arc::clone(&schema), settings.services.hints.clone()),
            settings,
            pools,
            executor,
            schema,
            discovery,
        };

        if !pilot.settings.preload_tables.is_empty() {
            let report = pilot.schema.preload(&pilot.settings.preload_tables).await;
            info!(
                loaded = report.tables_refreshed,
                failed = report.errors.len(),
                "preloaded table metadata"
            );
        }

        info!(
            dsn = %pilot.settings.database.redacted_dsn(),
            "sqlpilot started"
        );
        pilot
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn schema_cache(&self) -> &Arc<SchemaMetadataCache> {
        &self.schema
    }

    pub fn column_stats(&self) -> &ColumnStatisticsCache {
        &self.column_stats
    }

    /// Run a query and return a structured, formatted result.
    pub async fn execute_sql(&self, query: &str, params: &[Value], options: &SqlOptions) -> ExecutionResult {
        self.executor.execute_sql(query, params, options).await
    }

    pub async fn execute(
        &self,
        query: &str,
        params: &[Value],
        timeout: Option<Duration>,
        mode: FetchMode,
    ) -> ExecResult<QueryOutput> {
        self.executor.execute(query, params, timeout, mode).await
    }

    /// Run statements atomically and return a structured result.
    pub async fn execute_transaction(
        &self,
        statements: &[Statement],
        timeout: Option<Duration>,
    ) -> TransactionResult {
        self.executor.execute_transaction_sql(statements, timeout).await
    }

    pub async fn get_table_metadata(&self, table: &str) -> ExecResult<Arc<TableMetadata>> {
        self.schema.get_table_metadata(table, false).await
    }

    pub async fn get_column_statistics(
        &self,
        table: &str,
        column: &str,
        refresh: bool,
    ) -> ExecResult<Arc<ColumnStatistic>> {
        self.column_stats.get_column_statistics(table, column, refresh).await
    }

    pub async fn suggest_joins(&self, left_table: &str, right_table: &str) -> ExecResult<Vec<JoinSuggestion>> {
        self.joins.suggest_joins(left_table, right_table).await
    }

    pub async fn join_path(&self, from: &str, to: &str) -> ExecResult<Option<Vec<GraphEdge>>> {
        self.joins.join_path(from, to).await
    }

    pub async fn discover_relationships(&self, start_table: Option<&str>, max_depth: usize) -> RelationshipGraph {
        self.discovery.discover(start_table, max_depth).await
    }

    pub async fn hints(&self, sql: &str) -> QueryHints {
        self.hints.hints(sql).await
    }

    /// Re-introspect every table and drop cached column statistics.
    pub async fn refresh_schema(&self) -> ExecResult<RefreshReport> {
        let report = self.schema.refresh_all().await?;
        self.column_stats.clear().await;
        Ok(report)
    }

    pub async fn pool_stats(&self) -> Option<PoolStats> {
        self.pools.stats().await
    }

    /// Close the pool. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.pools.close_all().await;
        info!("sqlpilot shut down");
    }
}
