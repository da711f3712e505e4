//! Table metadata types.
//!
//! Snapshots are produced by a [`SchemaProvider`](super::SchemaProvider) and
//! published by the metadata cache behind an `Arc`; once published they are
//! never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic kind of a column, resolved once from the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    /// Fixed-point numeric (DECIMAL, NUMERIC, MONEY).
    Decimal,
    Boolean,
    Text,
    Date,
    Time,
    Timestamp,
    Binary,
    Other,
}

impl ColumnKind {
    /// Resolve a declared column type.
    ///
    /// Follows SQLite affinity rules for names it does not know, so
    /// `VARCHAR(40)` is text and `BIGINT UNSIGNED` is an integer.
    pub fn from_declared(type_name: &str) -> Self {
        let lower = type_name.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();

        match base {
            "" => return ColumnKind::Other,
            "bool" | "boolean" | "bit" => return ColumnKind::Boolean,
            "date" => return ColumnKind::Date,
            "time" => return ColumnKind::Time,
            "timestamp" | "datetime" | "datetime2" | "smalldatetime" | "timestamptz"
            | "timestamp with time zone" | "timestamp without time zone" => {
                return ColumnKind::Timestamp
            }
            "decimal" | "numeric" | "money" | "smallmoney" | "number" => {
                return ColumnKind::Decimal
            }
            _ => {}
        }

        if base.contains("int") {
            ColumnKind::Integer
        } else if base.contains("char") || base.contains("clob") || base.contains("text") {
            ColumnKind::Text
        } else if base.contains("blob") || base.contains("binary") || base == "bytea" {
            ColumnKind::Binary
        } else if base.contains("real") || base.contains("floa") || base.contains("doub") {
            ColumnKind::Float
        } else if base.starts_with("timestamp") {
            ColumnKind::Timestamp
        } else {
            ColumnKind::Other
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnKind::Integer | ColumnKind::Float | ColumnKind::Decimal
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnKind::Date | ColumnKind::Time | ColumnKind::Timestamp
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnKind::Text)
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as reported by the database.
    #[serde(rename = "type")]
    pub data_type: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Default value expression.
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub is_autoincrement: bool,
}

impl ColumnDescriptor {
    /// A nullable, non-key column of the given declared type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            kind: ColumnKind::from_declared(&data_type),
            data_type,
            nullable: true,
            default: None,
            is_primary_key: false,
            is_autoincrement: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub name: String,
    pub referred_table: String,
    pub local_columns: Vec<String>,
    pub referred_columns: Vec<String>,
}

/// An index on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Complete metadata for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key columns, in key order.
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyRef>,
    pub indices: Vec<IndexDescriptor>,
    /// Best-effort row count; `None` when the probe failed.
    pub row_count_estimate: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
            row_count_estimate: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Mark `columns` as the primary key, flagging the matching descriptors.
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_keys = columns.iter().map(|c| c.to_string()).collect();
        for col in &mut self.columns {
            col.is_primary_key = columns.iter().any(|c| c.eq_ignore_ascii_case(&col.name));
            if col.is_primary_key {
                col.nullable = false;
            }
        }
        self
    }

    pub fn with_foreign_key(
        mut self,
        local_columns: &[&str],
        referred_table: &str,
        referred_columns: &[&str],
    ) -> Self {
        let name = format!("fk_{}_{}", self.name, self.foreign_keys.len());
        self.foreign_keys.push(ForeignKeyRef {
            name,
            referred_table: referred_table.to_string(),
            local_columns: local_columns.iter().map(|c| c.to_string()).collect(),
            referred_columns: referred_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn with_index(mut self, name: &str, unique: bool, columns: &[&str]) -> Self {
        self.indices.push(IndexDescriptor {
            name: name.to_string(),
            unique,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn with_row_count(mut self, rows: i64) -> Self {
        self.row_count_estimate = Some(rows);
        self
    }

    /// Get a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_keys
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// The primary key column when the key is a single column.
    pub fn single_primary_key(&self) -> Option<&str> {
        match self.primary_keys.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Check if any index or the primary key covers `column`.
    pub fn is_indexed(&self, column: &str) -> bool {
        self.is_primary_key_column(column)
            || self
                .indices
                .iter()
                .any(|idx| idx.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Foreign keys of this table that point at `table`.
    pub fn foreign_keys_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKeyRef> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.referred_table.eq_ignore_ascii_case(table))
    }
}
