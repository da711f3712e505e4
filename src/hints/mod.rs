//! Advisory query hints.
//!
//! Pulls table names and filtered columns out of SQL text with regular
//! expressions and checks them against the metadata cache. This is a
//! best-effort heuristic, not a parser: SQL it cannot follow yields fewer
//! hints, never an error, and nothing here touches query execution.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::SchemaMetadataCache;
use crate::config::HintSettings;
use crate::error::ExecError;
use crate::execution::LIMIT_CLAUSE;
use crate::schema::TableMetadata;

static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid literal regex"));

static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:from|join)\s+((?:[A-Za-z_][\w$]*\.)?(?:[A-Za-z_][\w$]*|"[^"]+"|`[^`]+`|\[[^\]]+\]))(?:\s+(?:as\s+)?([A-Za-z_]\w*))?"#,
    )
    .expect("valid table regex")
});

static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bwhere\b(.*?)(?:\bgroup\s+by\b|\border\s+by\b|\bhaving\b|\blimit\b|\bunion\b|$)")
        .expect("valid where regex")
});

static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\b([A-Za-z_]\w*)\.)?\b([A-Za-z_]\w*)\s*(?:=|!=|<>|<=|>=|<|>|\blike\b|\bin\b|\bis\b|\bbetween\b)",
    )
    .expect("valid comparison regex")
});

static ORDER_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\border\s+by\b").expect("valid order regex"));
static SELECT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bselect\s+(?:distinct\s+)?(?:[A-Za-z_]\w*\.)?\*").expect("valid star regex")
});

/// Words that can follow a table name but are not aliases.
const NOT_ALIASES: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "outer", "cross", "natural", "on", "using",
    "group", "order", "having", "limit", "offset", "union", "except", "intersect", "window", "as",
];

/// Identifiers that look like columns in a WHERE clause but are keywords.
const NOT_COLUMNS: &[&str] = &["and", "or", "not", "null", "where", "exists", "case", "when", "then", "else"];

/// A table named after FROM or JOIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

/// A column compared in the WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

/// Tokens pulled out of a SQL string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlTokens {
    pub tables: Vec<TableRef>,
    pub filter_columns: Vec<ColumnRef>,
    pub has_limit: bool,
    pub has_order_by: bool,
    pub selects_star: bool,
}

impl SqlTokens {
    /// Extract tokens from `sql`. String literals are ignored.
    pub fn extract(sql: &str) -> Self {
        let sql = STRING_LITERAL.replace_all(sql, "''");

        let mut tables: Vec<TableRef> = Vec::new();
        for caps in TABLE_REF.captures_iter(&sql) {
            let name = unquote(&caps[1]);
            if tables.iter().any(|t| t.name.eq_ignore_ascii_case(&name)) {
                continue;
            }
            let alias = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|a| !NOT_ALIASES.contains(&a.to_lowercase().as_str()))
                .map(str::to_string);
            tables.push(TableRef { name, alias });
        }

        let mut filter_columns: Vec<ColumnRef> = Vec::new();
        if let Some(clause) = WHERE_CLAUSE.captures(&sql).and_then(|c| c.get(1)) {
            for caps in COMPARISON.captures_iter(clause.as_str()) {
                let name = caps[2].to_string();
                if NOT_COLUMNS.contains(&name.to_lowercase().as_str()) {
                    continue;
                }
                let column = ColumnRef {
                    qualifier: caps.get(1).map(|m| m.as_str().to_string()),
                    name,
                };
                if !filter_columns.contains(&column) {
                    filter_columns.push(column);
                }
            }
        }

        Self {
            tables,
            filter_columns,
            has_limit: LIMIT_CLAUSE.is_match(&sql),
            has_order_by: ORDER_BY.is_match(&sql),
            selects_star: SELECT_STAR.is_match(&sql),
        }
    }
}

fn unquote(name: &str) -> String {
    name.split('.')
        .map(|part| part.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')))
        .collect::<Vec<_>>()
        .join(".")
}

/// Name to look up in the cache; drops a schema qualifier.
fn lookup_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

/// An index that would cover a filtered column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSuggestion {
    pub table: String,
    pub column: String,
    pub reason: String,
}

/// Something likely wrong with the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryIssue {
    UnknownTables { tables: Vec<String>, message: String },
    MissingOrderBy { message: String },
}

/// A way to make the query cheaper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Optimization {
    Pagination {
        table: String,
        row_count_estimate: i64,
        message: String,
    },
    SelectStar {
        table: String,
        column_count: usize,
        message: String,
    },
}

/// Hints for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryHints {
    pub tables_referenced: Vec<String>,
    pub suggested_indices: Vec<IndexSuggestion>,
    pub potential_issues: Vec<QueryIssue>,
    pub optimization_suggestions: Vec<Optimization>,
}

/// Cross-references SQL tokens with cached metadata.
pub struct QueryHintGenerator {
    schema: Arc<SchemaMetadataCache>,
    settings: HintSettings,
}

impl QueryHintGenerator {
    pub fn new(schema: Arc<SchemaMetadataCache>, settings: HintSettings) -> Self {
        Self { schema, settings }
    }

    pub async fn hints(&self, sql: &str) -> QueryHints {
        let tokens = SqlTokens::extract(sql);

        let mut known: Vec<(&TableRef, Arc<TableMetadata>)> = Vec::new();
        let mut unknown: Vec<String> = Vec::new();
        for table in &tokens.tables {
            match self.schema.get_table_metadata(lookup_name(&table.name), false).await {
                Ok(metadata) => known.push((table, metadata)),
                Err(ExecError::NotFound { .. }) => {
                    debug!(table = %table.name, "table not in schema");
                    unknown.push(table.name.clone());
                }
                Err(err) => {
                    warn!(table = %table.name, error = %err, "skipping hints for table");
                }
            }
        }

        let mut hints = QueryHints {
            tables_referenced: tokens.tables.iter().map(|t| t.name.clone()).collect(),
            suggested_indices: suggest_indices(&tokens, &known),
            ..QueryHints::default()
        };

        if !unknown.is_empty() {
            hints.potential_issues.push(QueryIssue::UnknownTables {
                message: format!("tables not found in the schema: {}", unknown.join(", ")),
                tables: unknown,
            });
        }
        if tokens.has_limit && !tokens.has_order_by {
            hints.potential_issues.push(QueryIssue::MissingOrderBy {
                message: "LIMIT without ORDER BY returns an arbitrary subset of rows".to_string(),
            });
        }

        for (_, metadata) in &known {
            if let Some(rows) = metadata.row_count_estimate {
                if !tokens.has_limit && rows > self.settings.large_table_threshold {
                    hints.optimization_suggestions.push(Optimization::Pagination {
                        table: metadata.name.clone(),
                        row_count_estimate: rows,
                        message: format!(
                            "{} has about {} rows; add LIMIT/OFFSET to page through results",
                            metadata.name, rows
                        ),
                    });
                }
            }
            if tokens.selects_star && metadata.columns.len() > self.settings.wide_table_columns {
                hints.optimization_suggestions.push(Optimization::SelectStar {
                    table: metadata.name.clone(),
                    column_count: metadata.columns.len(),
                    message: format!(
                        "{} has {} columns; select only the columns you need",
                        metadata.name,
                        metadata.columns.len()
                    ),
                });
            }
        }

        hints
    }
}

/// Filtered columns that exist in a referenced table but are not indexed.
fn suggest_indices(tokens: &SqlTokens, known: &[(&TableRef, Arc<TableMetadata>)]) -> Vec<IndexSuggestion> {
    let mut by_name: HashMap<String, &TableMetadata> = HashMap::new();
    for (table, metadata) in known {
        by_name.insert(table.name.to_lowercase(), metadata);
        by_name.insert(metadata.name.to_lowercase(), metadata);
        if let Some(alias) = &table.alias {
            by_name.insert(alias.to_lowercase(), metadata);
        }
    }

    let mut suggestions: Vec<IndexSuggestion> = Vec::new();
    for column in &tokens.filter_columns {
        let owner = match &column.qualifier {
            Some(q) => by_name.get(&q.to_lowercase()).copied(),
            None => known
                .iter()
                .map(|(_, m)| m.as_ref())
                .find(|m| m.has_column(&column.name)),
        };
        let Some(table) = owner else { continue };
        let Some(descriptor) = table.column(&column.name) else {
            continue;
        };
        if table.is_indexed(&descriptor.name) {
            continue;
        }
        let duplicate = suggestions
            .iter()
            .any(|s| s.table == table.name && s.column == descriptor.name);
        if !duplicate {
            suggestions.push(IndexSuggestion {
                table: table.name.clone(),
                column: descriptor.name.clone(),
                reason: format!(
                    "{}.{} is filtered on but not covered by an index",
                    table.name, descriptor.name
                ),
            });
        }
    }
    suggestions
}
