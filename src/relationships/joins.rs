//! Join condition suggestions.
//!
//! Ranking, highest confidence first:
//!
//! | Source                                         | Confidence |
//! |------------------------------------------------|------------|
//! | Foreign key either way                         | 1.0        |
//! | `<table>_id` paired with the other primary key | 0.9        |
//! | `<singular>_id` paired with the primary key    | 0.8        |
//! | Same column name on both sides                 | 0.7        |
//!
//! Name heuristics run only when no foreign key connects the tables.

use std::sync::Arc;

use serde::Serialize;

use super::discovery::{GraphEdge, RelationshipDiscovery};
use super::inflection::reference_column_names;
use crate::cache::SchemaMetadataCache;
use crate::error::{ExecError, ExecResult};
use crate::schema::TableMetadata;

pub const FOREIGN_KEY_CONFIDENCE: f64 = 1.0;
pub const SHARED_NAME_CONFIDENCE: f64 = 0.7;

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    ForeignKey,
    NameMatch,
}

/// A candidate join condition between two tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinSuggestion {
    pub kind: JoinKind,
    pub confidence: f64,
    pub left_table: String,
    pub right_table: String,
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
    pub description: String,
}

impl JoinSuggestion {
    /// The `ON` condition, e.g. `orders.customer_id = users.id`.
    pub fn condition(&self) -> String {
        self.left_columns
            .iter()
            .zip(&self.right_columns)
            .map(|(l, r)| format!("{}.{} = {}.{}", self.left_table, l, self.right_table, r))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Rank join conditions between `left` and `right`.
pub fn rank_joins(left: &TableMetadata, right: &TableMetadata) -> Vec<JoinSuggestion> {
    let mut suggestions = Vec::new();

    for fk in left.foreign_keys_to(&right.name) {
        suggestions.push(JoinSuggestion {
            kind: JoinKind::ForeignKey,
            confidence: FOREIGN_KEY_CONFIDENCE,
            left_table: left.name.clone(),
            right_table: right.name.clone(),
            left_columns: fk.local_columns.clone(),
            right_columns: fk.referred_columns.clone(),
            description: format!(
                "foreign key {}({}) references {}({})",
                left.name,
                fk.local_columns.join(", "),
                right.name,
                fk.referred_columns.join(", ")
            ),
        });
    }
    // A self-referencing key was already matched above.
    let self_join = left.name.eq_ignore_ascii_case(&right.name);
    for fk in right.foreign_keys_to(&left.name).filter(|_| !self_join) {
        suggestions.push(JoinSuggestion {
            kind: JoinKind::ForeignKey,
            confidence: FOREIGN_KEY_CONFIDENCE,
            left_table: left.name.clone(),
            right_table: right.name.clone(),
            left_columns: fk.referred_columns.clone(),
            right_columns: fk.local_columns.clone(),
            description: format!(
                "foreign key {}({}) references {}({})",
                right.name,
                fk.local_columns.join(", "),
                left.name,
                fk.referred_columns.join(", ")
            ),
        });
    }
    if !suggestions.is_empty() {
        return suggestions;
    }

    // left.<right>_id -> right.pk
    if let Some(pk) = right.single_primary_key() {
        for (name, confidence) in reference_column_names(&right.name) {
            if let Some(column) = left.column(&name) {
                push_unique(
                    &mut suggestions,
                    name_match(left, right, &column.name, pk, confidence, "naming convention"),
                );
            }
        }
    }
    // left.pk <- right.<left>_id
    if let Some(pk) = left.single_primary_key() {
        for (name, confidence) in reference_column_names(&left.name) {
            if let Some(column) = right.column(&name) {
                push_unique(
                    &mut suggestions,
                    name_match(left, right, pk, &column.name, confidence, "naming convention"),
                );
            }
        }
    }

    for column in &left.columns {
        let Some(other) = right.column(&column.name) else {
            continue;
        };
        if left.is_primary_key_column(&column.name) && right.is_primary_key_column(&other.name) {
            continue;
        }
        push_unique(
            &mut suggestions,
            name_match(
                left,
                right,
                &column.name,
                &other.name,
                SHARED_NAME_CONFIDENCE,
                "shared column name",
            ),
        );
    }

    suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    suggestions
}

fn name_match(
    left: &TableMetadata,
    right: &TableMetadata,
    left_column: &str,
    right_column: &str,
    confidence: f64,
    reason: &str,
) -> JoinSuggestion {
    JoinSuggestion {
        kind: JoinKind::NameMatch,
        confidence,
        left_table: left.name.clone(),
        right_table: right.name.clone(),
        left_columns: vec![left_column.to_string()],
        right_columns: vec![right_column.to_string()],
        description: format!(
            "{}: {}.{} = {}.{}",
            reason, left.name, left_column, right.name, right_column
        ),
    }
}

/// Keep the first (highest-confidence) suggestion for a column pair.
fn push_unique(suggestions: &mut Vec<JoinSuggestion>, candidate: JoinSuggestion) {
    let duplicate = suggestions.iter().any(|s| {
        s.left_columns == candidate.left_columns && s.right_columns == candidate.right_columns
    });
    if !duplicate {
        suggestions.push(candidate);
    }
}

/// Suggests joins using cached metadata and the relationship graph.
pub struct JoinSuggestionEngine {
    schema: Arc<SchemaMetadataCache>,
    discovery: Arc<RelationshipDiscovery>,
}

impl JoinSuggestionEngine {
    pub fn new(schema: Arc<SchemaMetadataCache>, discovery: Arc<RelationshipDiscovery>) -> Self {
        Self { schema, discovery }
    }

    /// Ranked join conditions between two named tables.
    ///
    /// Unknown tables are `NotFound`.
    pub async fn suggest_joins(&self, left_table: &str, right_table: &str) -> ExecResult<Vec<JoinSuggestion>> {
        let left = self.schema.get_table_metadata(left_table, false).await?;
        let right = self.schema.get_table_metadata(right_table, false).await?;
        Ok(rank_joins(&left, &right))
    }

    /// Foreign-key hops needed to join `from` to `to`.
    ///
    /// Searches the whole schema's graph; `Ok(None)` when the tables are not
    /// connected.
    pub async fn join_path(&self, from: &str, to: &str) -> ExecResult<Option<Vec<GraphEdge>>> {
        // Validate both names first so a typo is NotFound, not "unconnected".
        self.schema.get_table_metadata(from, false).await?;
        self.schema.get_table_metadata(to, false).await?;

        let graph = self.discovery.discover(None, 1).await;
        if let Some(error) = graph.error {
            return Err(ExecError::transient(error.message));
        }
        Ok(graph
            .join_path(from, to)
            .map(|edges| edges.into_iter().cloned().collect()))
    }
}
