//! SQLite backend built on rusqlite.
//!
//! rusqlite is blocking, so every call runs on the blocking thread pool and
//! the async caller suspends until it finishes. The interrupt handle is kept
//! outside the connection mutex so a timed-out statement can be aborted while
//! the blocking task still holds the connection.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::InterruptHandle;
use tracing::debug;

use super::{Connection, Connector};
use crate::config::DatabaseSettings;
use crate::error::{ExecError, ExecResult};
use crate::schema::ColumnKind;
use crate::value::{RowSet, Value};

/// Opens rusqlite connections on the file named by `database.name`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self, settings: &DatabaseSettings) -> ExecResult<Box<dyn Connection>> {
        let path = settings.name.clone();
        let busy_timeout = settings.command_timeout();

        let opened = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)?;
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", true)?;
            Ok::<_, rusqlite::Error>(conn)
        })
        .await
        .map_err(|e| ExecError::ConnectionFailure(e.to_string()))?;

        let conn = opened.map_err(|e| {
            ExecError::ConnectionFailure(format!("cannot open '{}': {}", settings.name, e))
        })?;

        debug!(
            tag = %settings.application_tag,
            database = %settings.name,
            "opened sqlite connection"
        );
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

/// A rusqlite connection driven from async code.
pub struct SqliteConnection {
    inner: Arc<Mutex<rusqlite::Connection>>,
    interrupt: InterruptHandle,
}

impl SqliteConnection {
    pub fn new(conn: rusqlite::Connection) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            inner: Arc::new(Mutex::new(conn)),
            interrupt,
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> ExecResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> ExecResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .lock()
                .map_err(|_| ExecError::transient("sqlite connection lock poisoned"))?;
            f(&mut *conn)
        })
        .await?
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> ExecResult<RowSet> {
        let owned_sql = sql.to_string();
        let params: Vec<SqliteValue> = params.iter().map(to_sqlite).collect();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&owned_sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let kinds: Vec<ColumnKind> = stmt
                .columns()
                .iter()
                .map(|c| c.decl_type().map(ColumnKind::from_declared).unwrap_or(ColumnKind::Other))
                .collect();

            let mut result = RowSet::new(columns);
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(kinds.len());
                for (idx, kind) in kinds.iter().enumerate() {
                    values.push(from_sqlite(row.get_ref(idx)?, *kind));
                }
                result.push(values);
            }
            Ok(result)
        })
        .await
        .map_err(|e| e.with_query(sql))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> ExecResult<u64> {
        let owned_sql = sql.to_string();
        let params: Vec<SqliteValue> = params.iter().map(to_sqlite).collect();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&owned_sql)?;
            if stmt.column_count() > 0 {
                // Row-returning statement: drain it and report no changes.
                let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                while rows.next()?.is_some() {}
                return Ok(0);
            }
            let changed = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
            Ok(changed as u64)
        })
        .await
        .map_err(|e| e.with_query(sql))
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Decimal(d) => SqliteValue::Text(d.to_string()),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Date(d) => SqliteValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqliteValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::Timestamp(ts) => SqliteValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
    }
}

/// Convert a stored value using the declared kind of its column.
fn from_sqlite(value: ValueRef<'_>, kind: ColumnKind) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match kind {
            ColumnKind::Boolean => Value::Bool(i != 0),
            ColumnKind::Decimal => Value::Decimal(Decimal::from(i)),
            ColumnKind::Float => Value::Float(i as f64),
            _ => Value::Int(i),
        },
        ValueRef::Real(f) => match kind {
            ColumnKind::Decimal => Decimal::from_f64(f)
                .map(Value::Decimal)
                .unwrap_or(Value::Float(f)),
            _ => Value::Float(f),
        },
        ValueRef::Text(bytes) => parse_text(String::from_utf8_lossy(bytes).into_owned(), kind),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// SQLite stores temporal and fixed-point values as text; recover them.
/// Anything that does not parse stays text.
fn parse_text(text: String, kind: ColumnKind) -> Value {
    let trimmed = text.trim();
    let parsed = match kind {
        ColumnKind::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        ColumnKind::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
            .ok()
            .map(Value::Time),
        ColumnKind::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        ColumnKind::Decimal => Decimal::from_str(trimmed).ok().map(Value::Decimal),
        ColumnKind::Integer => trimmed.parse::<i64>().ok().map(Value::Int),
        ColumnKind::Float => trimmed.parse::<f64>().ok().map(Value::Float),
        _ => None,
    };
    parsed.unwrap_or(Value::Text(text))
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
