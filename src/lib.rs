//! # SqlPilot
//!
//! A schema-aware SQL execution layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SqlPilot (facade)                       │
//! │  execute_sql · suggest_joins · hints · get_table_metadata│
//! └─────────────────────────────────────────────────────────┘
//!            │                               │
//!            ▼                               ▼
//! ┌──────────────────────┐      ┌───────────────────────────┐
//! │  QueryExecutor       │      │  SchemaMetadataCache      │
//! │  timeout · retry     │◀─────│  ColumnStatisticsCache    │
//! │  Result formatter    │      │  (TTL, Arc snapshots)     │
//! └──────────────────────┘      └───────────────────────────┘
//!            │                               │
//!            ▼                               ▼
//! ┌──────────────────────┐      ┌───────────────────────────┐
//! │  PoolManager         │      │  RelationshipDiscovery    │
//! │  ConnectionPool      │      │  JoinSuggestionEngine     │
//! └──────────────────────┘      │  QueryHintGenerator       │
//!            │                  └───────────────────────────┘
//!            ▼
//! ┌──────────────────────┐
//! │  Connector (SQLite)  │
//! └──────────────────────┘
//! ```
//!
//! Metadata introspection runs through the executor, so it shares the pool,
//! deadlines and retry policy of user queries.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod execution;
pub mod format;
pub mod hints;
pub mod pool;
pub mod relationships;
pub mod schema;
pub mod service;
pub mod value;

pub use error::{ErrorInfo, ExecError, ExecResult};
pub use service::SqlPilot;
pub use value::{RowSet, Value};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{ErrorInfo, ExecError, ExecResult};
    pub use crate::execution::{ExecutionResult, FetchMode, QueryOutput, SqlOptions, Statement};
    pub use crate::format::{FormatOptions, FormatType, FormattedOutput};
    pub use crate::relationships::{JoinKind, JoinSuggestion};
    pub use crate::service::SqlPilot;
    pub use crate::value::{RowSet, Value};
}
