//! Shared fixtures for integration tests.
//!
//! - `FakeConnector`: scripted connections for pool and executor tests.
//! - `FakeProvider`: in-memory schema for cache and engine tests.
//! - `shop_db`: an on-disk SQLite database with a small shop schema.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlpilot::backend::{Connection, Connector};
use sqlpilot::config::{DatabaseSettings, Settings};
use sqlpilot::schema::{ColumnDescriptor, SchemaProvider, TableMetadata};
use sqlpilot::{ExecError, ExecResult, RowSet, Value};
use tempfile::TempDir;

// =============================================================================
// Fake connections
// =============================================================================

/// What a fake connection does when asked to run a statement.
#[derive(Clone)]
pub enum Behavior {
    /// Return these rows.
    Rows(RowSet),
    /// Fail with a transient error every time.
    AlwaysFail,
    /// Fail the first `n` statements, then return the rows.
    FailFirst(usize, RowSet),
    /// Sleep, then return the rows.
    Delay(Duration, RowSet),
}

#[derive(Default)]
pub struct FakeState {
    pub connects: AtomicUsize,
    pub statements: AtomicUsize,
    pub interrupts: AtomicUsize,
    pub open: AtomicUsize,
    pub fail_connect: AtomicBool,
    behavior: Mutex<Option<Behavior>>,
}

/// A connector whose connections follow a scripted [`Behavior`].
#[derive(Clone)]
pub struct FakeConnector {
    pub state: Arc<FakeState>,
}

impl FakeConnector {
    pub fn new(behavior: Behavior) -> Self {
        let state = FakeState::default();
        *state.behavior.lock().unwrap() = Some(behavior);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn returning(rows: RowSet) -> Self {
        Self::new(Behavior::Rows(rows))
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.state.behavior.lock().unwrap() = Some(behavior);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> usize {
        self.state.statements.load(Ordering::SeqCst)
    }

    pub fn interrupts(&self) -> usize {
        self.state.interrupts.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _settings: &DatabaseSettings) -> ExecResult<Box<dyn Connection>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(ExecError::ConnectionFailure("refused".to_string()));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeConnection {
    state: Arc<FakeState>,
}

impl FakeConnection {
    async fn run(&mut self) -> ExecResult<RowSet> {
        let attempt = self.state.statements.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.behavior.lock().unwrap().clone();
        match behavior.expect("behavior set") {
            Behavior::Rows(rows) => Ok(rows),
            Behavior::AlwaysFail => Err(ExecError::transient("connection reset by peer")),
            Behavior::FailFirst(n, rows) => {
                if attempt < n {
                    Err(ExecError::transient("deadlock detected"))
                } else {
                    Ok(rows)
                }
            }
            Behavior::Delay(delay, rows) => {
                tokio::time::sleep(delay).await;
                Ok(rows)
            }
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn query(&mut self, _sql: &str, _params: &[Value]) -> ExecResult<RowSet> {
        self.run().await
    }

    async fn execute(&mut self, _sql: &str, _params: &[Value]) -> ExecResult<u64> {
        self.run().await.map(|rows| rows.len() as u64)
    }

    fn interrupt(&self) {
        self.state.interrupts.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Database settings suitable for fake connectors.
pub fn fake_database_settings() -> DatabaseSettings {
    let mut settings = DatabaseSettings::for_path(":fake:");
    settings.min_pool_size = 0;
    settings.max_pool_size = 2;
    settings.connect_timeout = 5.0;
    settings.max_inactive_connection_lifetime = 60.0;
    settings
}

pub fn rows_of_ints(column: &str, values: &[i64]) -> RowSet {
    RowSet::with_rows(
        vec![column.to_string()],
        values.iter().map(|v| vec![Value::Int(*v)]).collect(),
    )
}

// =============================================================================
// Fake schema
// =============================================================================

type AggregateFn = dyn Fn(&str) -> ExecResult<RowSet> + Send + Sync;

/// An in-memory [`SchemaProvider`].
pub struct FakeProvider {
    tables: HashMap<String, TableMetadata>,
    row_counts: HashMap<String, i64>,
    count_fails: bool,
    timeouts: HashSet<String>,
    fetch_delays: Mutex<VecDeque<Duration>>,
    aggregate: Box<AggregateFn>,
    pub fetches: Mutex<HashMap<String, usize>>,
    pub aggregates: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(tables: Vec<TableMetadata>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name.to_lowercase(), t))
                .collect(),
            row_counts: HashMap::new(),
            count_fails: false,
            timeouts: HashSet::new(),
            fetch_delays: Mutex::new(VecDeque::new()),
            aggregate: Box::new(|_| Ok(RowSet::default())),
            fetches: Mutex::new(HashMap::new()),
            aggregates: Mutex::new(Vec::new()),
        }
    }

    pub fn with_row_count(mut self, table: &str, rows: i64) -> Self {
        self.row_counts.insert(table.to_lowercase(), rows);
        self
    }

    pub fn with_failing_count(mut self) -> Self {
        self.count_fails = true;
        self
    }

    /// Introspecting `table` fails with a timeout.
    pub fn with_timeout(mut self, table: &str) -> Self {
        self.timeouts.insert(table.to_lowercase());
        self
    }

    /// Successive `get_table` calls sleep for these durations, in order.
    pub fn with_fetch_delays(self, delays: Vec<Duration>) -> Self {
        *self.fetch_delays.lock().unwrap() = delays.into();
        self
    }

    pub fn with_aggregate<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> ExecResult<RowSet> + Send + Sync + 'static,
    {
        self.aggregate = Box::new(f);
        self
    }

    /// How many times `table` was introspected.
    pub fn fetch_count(&self, table: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&table.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn aggregate_queries(&self) -> Vec<String> {
        self.aggregates.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaProvider for FakeProvider {
    async fn list_tables(&self) -> ExecResult<Vec<String>> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn get_table(&self, table: &str) -> ExecResult<TableMetadata> {
        let key = table.to_lowercase();
        *self.fetches.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
        let delay = self.fetch_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.timeouts.contains(&key) {
            return Err(ExecError::Timeout {
                operation: format!("introspect {}", table),
                after: Duration::from_secs(30),
            });
        }
        self.tables
            .get(&key)
            .cloned()
            .ok_or_else(|| ExecError::table_not_found(table))
    }

    async fn count_rows(&self, table: &str) -> ExecResult<i64> {
        if self.count_fails {
            return Err(ExecError::transient("permission denied for COUNT"));
        }
        Ok(self
            .row_counts
            .get(&table.to_lowercase())
            .copied()
            .unwrap_or(0))
    }

    async fn aggregate(&self, sql: &str) -> ExecResult<RowSet> {
        self.aggregates.lock().unwrap().push(sql.to_string());
        (self.aggregate)(sql)
    }
}

/// users <- orders -> products, plus a self-referencing employees table.
pub fn shop_tables() -> Vec<TableMetadata> {
    vec![
        TableMetadata::new("users")
            .with_column(ColumnDescriptor::new("id", "INTEGER"))
            .with_column(ColumnDescriptor::new("email", "TEXT"))
            .with_column(ColumnDescriptor::new("signup_date", "DATE"))
            .with_primary_key(&["id"])
            .with_index("idx_users_email", true, &["email"]),
        TableMetadata::new("orders")
            .with_column(ColumnDescriptor::new("id", "INTEGER"))
            .with_column(ColumnDescriptor::new("customer_id", "INTEGER"))
            .with_column(ColumnDescriptor::new("product_id", "INTEGER"))
            .with_column(ColumnDescriptor::new("status", "TEXT"))
            .with_column(ColumnDescriptor::new("total", "DECIMAL(10,2)"))
            .with_primary_key(&["id"])
            .with_foreign_key(&["customer_id"], "users", &["id"])
            .with_foreign_key(&["product_id"], "products", &["id"])
            .with_index("idx_orders_customer", false, &["customer_id"]),
        TableMetadata::new("products")
            .with_column(ColumnDescriptor::new("id", "INTEGER"))
            .with_column(ColumnDescriptor::new("name", "TEXT"))
            .with_column(ColumnDescriptor::new("price", "REAL"))
            .with_primary_key(&["id"]),
        TableMetadata::new("employees")
            .with_column(ColumnDescriptor::new("id", "INTEGER"))
            .with_column(ColumnDescriptor::new("manager_id", "INTEGER"))
            .with_primary_key(&["id"])
            .with_foreign_key(&["manager_id"], "employees", &["id"]),
    ]
}

// =============================================================================
// SQLite fixture
// =============================================================================

const SHOP_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        signup_date DATE
    );
    CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        name VARCHAR(80) NOT NULL,
        price DECIMAL(10,2)
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES users(id),
        status TEXT DEFAULT 'new',
        placed_at TIMESTAMP
    );
    CREATE INDEX idx_orders_customer ON orders(customer_id);
    CREATE TABLE order_items (
        order_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL REFERENCES products,
        quantity INTEGER NOT NULL,
        PRIMARY KEY (order_id, product_id),
        FOREIGN KEY (order_id) REFERENCES orders(id)
    );

    INSERT INTO users (id, email, signup_date) VALUES
        (1, 'ada@example.com', '2024-01-05'),
        (2, 'grace@example.com', '2024-02-11'),
        (3, 'linus@example.com', NULL);
    INSERT INTO products (id, name, price) VALUES
        (1, 'Keyboard', '49.90'),
        (2, 'Mouse', '19.50');
    INSERT INTO orders (id, customer_id, status, placed_at) VALUES
        (1, 1, 'paid', '2024-03-01 10:00:00'),
        (2, 1, 'paid', '2024-03-02 11:30:00'),
        (3, 2, 'new', '2024-03-05 09:15:00');
    INSERT INTO order_items (order_id, product_id, quantity) VALUES
        (1, 1, 1), (1, 2, 2), (2, 2, 1), (3, 1, 3);
";

/// Create the shop database in a temp dir and return settings pointing at it.
pub fn shop_db() -> (TempDir, Settings) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(SHOP_SCHEMA).unwrap();
    drop(conn);

    let mut settings = Settings::default();
    settings.database = DatabaseSettings::for_path(path.to_string_lossy().to_string());
    settings.services.execution.retry_count = 1;
    settings.services.execution.retry_delay = 0.01;
    settings.services.execution.timeout = 10.0;
    (dir, settings)
}
