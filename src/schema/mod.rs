//! Schema model and introspection.
//!
//! [`SchemaProvider`] is the seam between the caches and the live database.
//! [`SqliteSchemaProvider`] introspects through the query executor, so
//! metadata reads share the pool, timeouts and retry policy of user queries.

mod provider;
mod sqlite_provider;
mod types;

pub use provider::{quote_ident, SchemaProvider};
pub use sqlite_provider::SqliteSchemaProvider;
pub use types::*;
