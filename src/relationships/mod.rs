//! Relationship discovery and join suggestions.
//!
//! Both read table metadata through the schema cache. The discovery engine
//! walks foreign keys breadth-first; the join engine ranks join conditions
//! between two tables from foreign keys first and naming conventions second.

mod discovery;
mod inflection;
mod joins;

pub use discovery::{GraphEdge, GraphNode, RelationshipDiscovery, RelationshipGraph, DEFAULT_MAX_DEPTH};
pub use inflection::{reference_column_names, singular_table_name};
pub use joins::{rank_joins, JoinKind, JoinSuggestion, JoinSuggestionEngine};
