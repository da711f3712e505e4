//! Database backend abstraction.
//!
//! The pool and executor talk to the database only through these two traits.
//! The shipped implementation is [`SqliteConnector`]; tests substitute their
//! own connectors to inject latency and failures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  QueryExecutor / SchemaProvider (async callers)          │
//! └──────────────────────────────────────────────────────────┘
//!                          │ acquire()
//!                          ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  ConnectionPool  ──connect()──▶  dyn Connector           │
//! │      idle queue of Box<dyn Connection>                   │
//! └──────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  SqliteConnection (rusqlite on spawn_blocking)           │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod sqlite;

pub use sqlite::{SqliteConnection, SqliteConnector};

use async_trait::async_trait;

use crate::config::DatabaseSettings;
use crate::error::ExecResult;
use crate::value::{RowSet, Value};

/// A live database connection.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement and materialize every row it returns.
    async fn query(&mut self, sql: &str, params: &[Value]) -> ExecResult<RowSet>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> ExecResult<u64>;

    async fn begin(&mut self) -> ExecResult<()> {
        self.execute("BEGIN", &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> ExecResult<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> ExecResult<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Ask the driver to abort the statement in flight, if it can.
    fn interrupt(&self) {}
}

/// Opens new connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &DatabaseSettings) -> ExecResult<Box<dyn Connection>>;
}
