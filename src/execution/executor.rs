//! The query executor.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    ExecutionResult, FetchMode, QueryOutput, SqlOptions, Statement, TransactionResult,
};
use crate::backend::Connection;
use crate::config::ExecutionSettings;
use crate::error::{query_fragment, ExecError, ExecResult};
use crate::format::{format_rows, summary_stats};
use crate::pool::PoolManager;
use crate::value::{RowSet, Value};

/// `LIMIT` with a literal or a bound parameter (`?`, `?1`, `:n`, `$1`).
pub(crate) static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blimit\s+(?:\d+|\?\d*|:\w+|\$\d+)").expect("valid limit regex")
});
static ROW_RETURNING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*(select|with)\b").expect("valid select regex"));

/// Append `LIMIT max_rows` to a SELECT/WITH statement that has no limit.
///
/// The clause goes on its own line so a trailing `--` comment cannot swallow
/// it. Other statements are returned unchanged, minus a trailing semicolon.
pub fn ensure_limit(sql: &str, max_rows: usize) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if !ROW_RETURNING.is_match(trimmed) || LIMIT_CLAUSE.is_match(trimmed) {
        return trimmed.to_string();
    }
    format!("{}\nLIMIT {}", trimmed, max_rows)
}

/// Runs statements on pooled connections.
pub struct QueryExecutor {
    pools: Arc<PoolManager>,
    settings: ExecutionSettings,
}

impl QueryExecutor {
    pub fn new(pools: Arc<PoolManager>, settings: ExecutionSettings) -> Self {
        Self { pools, settings }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    /// Execute one statement.
    ///
    /// Transient failures are retried up to `retry_count` times with
    /// `retry_delay` between attempts. Timeouts, connection failures and
    /// invalid arguments are returned immediately.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
        mode: FetchMode,
    ) -> ExecResult<QueryOutput> {
        let limit = timeout.unwrap_or_else(|| self.settings.timeout());
        let mut attempt: u32 = 0;

        loop {
            match self.execute_once(sql, params, limit, mode).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retriable() && attempt < self.settings.retry_count => {
                    attempt += 1;
                    warn!(
                        attempt,
                        retries = self.settings.retry_count,
                        error = %err,
                        query = %query_fragment(sql),
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(self.settings.retry_delay()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(
        &self,
        sql: &str,
        params: &[Value],
        limit: Duration,
        mode: FetchMode,
    ) -> ExecResult<QueryOutput> {
        let mut conn = self.pools.acquire().await?;
        let outcome = tokio::time::timeout(limit, fetch(&mut *conn, sql, params, mode)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                // The driver may still be busy; never hand this one back.
                conn.interrupt();
                conn.discard();
                Err(ExecError::Timeout {
                    operation: format!("query '{}'", query_fragment(sql)),
                    after: limit,
                })
            }
        }
    }

    /// Run `statements` in order inside one transaction on one connection.
    ///
    /// Any failure rolls the whole transaction back. Transactions are never
    /// retried.
    pub async fn execute_transaction(
        &self,
        statements: &[Statement],
        timeout: Option<Duration>,
    ) -> ExecResult<()> {
        if statements.is_empty() {
            return Err(ExecError::InvalidArgument(
                "transaction requires at least one statement".to_string(),
            ));
        }
        if let Some(idx) = statements.iter().position(|s| s.sql.trim().is_empty()) {
            return Err(ExecError::InvalidArgument(format!(
                "statement {} of the transaction is empty",
                idx + 1
            )));
        }

        let limit = timeout.unwrap_or_else(|| self.settings.timeout());
        let mut conn = self.pools.acquire().await?;
        let outcome = tokio::time::timeout(limit, run_transaction(&mut *conn, statements)).await;

        match outcome {
            Ok(Ok(())) => {
                debug!(statements = statements.len(), "transaction committed");
                Ok(())
            }
            Ok(Err(err)) => {
                conn.discard();
                Err(err)
            }
            Err(_) => {
                // Closing the connection abandons the open transaction.
                conn.interrupt();
                conn.discard();
                Err(ExecError::Timeout {
                    operation: format!("transaction of {} statements", statements.len()),
                    after: limit,
                })
            }
        }
    }

    /// Execute a query for an upstream caller and return a structured result.
    ///
    /// Never fails: errors are reported in `ExecutionResult::error`.
    pub async fn execute_sql(
        &self,
        query: &str,
        params: &[Value],
        options: &SqlOptions,
    ) -> ExecutionResult {
        let started = Instant::now();
        let max_rows = options.max_rows.or(self.settings.max_rows);
        let sql = match max_rows {
            Some(n) => ensure_limit(query, n),
            None => query.trim().to_string(),
        };

        match self
            .execute(&sql, params, options.timeout, FetchMode::All)
            .await
        {
            Ok(output) => {
                let mut rows = output.into_row_set();
                if let Some(n) = max_rows {
                    rows.truncate(n);
                }
                let row_count = rows.len();
                let truncated = max_rows.is_some_and(|n| row_count >= n);

                ExecutionResult {
                    success: true,
                    summary: options.include_summary.then(|| summary_stats(&rows)),
                    data: Some(format_rows(&rows, options.format, &options.format_options)),
                    error: None,
                    execution_time: started.elapsed().as_secs_f64(),
                    row_count,
                    truncated,
                    query: sql,
                }
            }
            Err(err) => {
                warn!(error = %err, query = %query_fragment(&sql), "query failed");
                ExecutionResult {
                    success: false,
                    data: None,
                    error: Some(err.to_info()),
                    execution_time: started.elapsed().as_secs_f64(),
                    row_count: 0,
                    truncated: false,
                    query: sql,
                    summary: None,
                }
            }
        }
    }

    /// [`execute_transaction`](Self::execute_transaction) as a structured result.
    pub async fn execute_transaction_sql(
        &self,
        statements: &[Statement],
        timeout: Option<Duration>,
    ) -> TransactionResult {
        let started = Instant::now();
        let result = self.execute_transaction(statements, timeout).await;
        if let Err(err) = &result {
            warn!(error = %err, statements = statements.len(), "transaction failed");
        }
        TransactionResult {
            success: result.is_ok(),
            error: result.err().map(|e| e.to_info()),
            execution_time: started.elapsed().as_secs_f64(),
            statement_count: statements.len(),
        }
    }
}

async fn fetch(
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
    mode: FetchMode,
) -> ExecResult<QueryOutput> {
    match mode {
        FetchMode::All => conn.query(sql, params).await.map(QueryOutput::Rows),
        FetchMode::One => {
            let mut rows = conn.query(sql, params).await?;
            rows.truncate(1);
            Ok(QueryOutput::Row(rows))
        }
        FetchMode::Scalar => {
            let rows = conn.query(sql, params).await?;
            Ok(QueryOutput::Scalar(first_cell(rows)))
        }
        FetchMode::Status => conn.execute(sql, params).await.map(QueryOutput::Status),
    }
}

fn first_cell(rows: RowSet) -> Value {
    rows.rows
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .unwrap_or(Value::Null)
}

async fn run_transaction(conn: &mut dyn Connection, statements: &[Statement]) -> ExecResult<()> {
    conn.begin().await?;

    for (idx, stmt) in statements.iter().enumerate() {
        if let Err(err) = conn.execute(&stmt.sql, &stmt.params).await {
            debug!(statement = idx + 1, error = %err, "rolling back transaction");
            if let Err(rollback) = conn.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            return Err(err);
        }
    }

    if let Err(err) = conn.commit().await {
        if let Err(rollback) = conn.rollback().await {
            warn!(error = %rollback, "rollback after failed commit failed");
        }
        return Err(err);
    }
    Ok(())
}
