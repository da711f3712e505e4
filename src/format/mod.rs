//! Result formatting.
//!
//! Converts a [`RowSet`] into JSON, CSV, aligned table text, or passes the
//! row set through, and computes per-column summary statistics. Every cell is
//! rendered through [`Value::to_json`] so JSON and CSV agree on temporal and
//! fixed-point values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::value::RowSet;

/// Marker emitted by table text for an empty result.
pub const NO_DATA: &str = "No data";

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    #[default]
    Json,
    Csv,
    TableText,
    RowSet,
}

impl FromStr for FormatType {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(FormatType::Json),
            "csv" => Ok(FormatType::Csv),
            "table_text" | "table" | "text" => Ok(FormatType::TableText),
            "row_set" | "rowset" | "rows" => Ok(FormatType::RowSet),
            other => Err(ExecError::InvalidArgument(format!(
                "unknown format '{}', expected json, csv, table_text or row_set",
                other
            ))),
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatType::Json => "json",
            FormatType::Csv => "csv",
            FormatType::TableText => "table_text",
            FormatType::RowSet => "row_set",
        };
        f.write_str(name)
    }
}

/// Formatting knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Cells wider than this are cut and end in `...` in table text.
    pub max_col_width: usize,
    pub pretty_json: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_col_width: 50,
            pretty_json: false,
        }
    }
}

/// A formatted result: text for json/csv/table_text, the rows for row_set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormattedOutput {
    Text(String),
    Rows(RowSet),
}

impl FormattedOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormattedOutput::Text(s) => Some(s),
            FormattedOutput::Rows(_) => None,
        }
    }
}

/// Format `rows` as `format`.
pub fn format_rows(rows: &RowSet, format: FormatType, options: &FormatOptions) -> FormattedOutput {
    match format {
        FormatType::Json => FormattedOutput::Text(to_json(rows, options.pretty_json)),
        FormatType::Csv => FormattedOutput::Text(to_csv(rows)),
        FormatType::TableText => FormattedOutput::Text(to_table_text(rows, options.max_col_width)),
        FormatType::RowSet => FormattedOutput::Rows(rows.clone()),
    }
}

/// JSON array of objects keyed by column name. Empty input is `[]`.
pub fn to_json(rows: &RowSet, pretty: bool) -> String {
    let records = serde_json::Value::Array(
        rows.to_records()
            .into_iter()
            .map(serde_json::Value::Object)
            .collect(),
    );
    if pretty {
        format!("{:#}", records)
    } else {
        records.to_string()
    }
}

/// CSV with a header line and `\n` line endings.
///
/// The header uses the same de-duplicated names as JSON keys. Fields
/// containing a delimiter, quote or line break are quoted.
pub fn to_csv(rows: &RowSet) -> String {
    if rows.columns.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(csv_line(rows.output_columns().into_iter()));
    for row in &rows.rows {
        lines.push(csv_line(row.iter().map(|v| v.to_text())));
    }
    lines.join("\n")
}

fn csv_line(fields: impl Iterator<Item = String>) -> String {
    fields.map(|f| csv_field(&f)).collect::<Vec<_>>().join(",")
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Aligned plain-text table.
pub fn to_table_text(rows: &RowSet, max_col_width: usize) -> String {
    if rows.is_empty() {
        return NO_DATA.to_string();
    }

    let body: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| row.iter().map(|v| clip(&v.to_text(), max_col_width)).collect())
        .collect();
    let header: Vec<String> = rows.columns.iter().map(|c| clip(c, max_col_width)).collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &body {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(render(&header));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &body {
        out.push(render(row));
    }
    out.join("\n")
}

fn clip(text: &str, max: usize) -> String {
    // Cells are single-line in table text.
    let text = text.replace(['\n', '\r'], " ");
    if text.chars().count() <= max {
        return text;
    }
    let keep = max.saturating_sub(3);
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str("...");
    clipped
}

/// Summary of a result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub column_stats: BTreeMap<String, ColumnSummary>,
}

/// Per-column summary; numeric when every non-null value coerces to a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnSummary {
    Numeric {
        null_count: usize,
        non_null_count: usize,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
    },
    Text {
        null_count: usize,
        non_null_count: usize,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
}

impl ColumnSummary {
    pub fn null_count(&self) -> usize {
        match self {
            ColumnSummary::Numeric { null_count, .. } | ColumnSummary::Text { null_count, .. } => {
                *null_count
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnSummary::Numeric { .. })
    }
}

/// Compute row/column counts and per-column statistics.
pub fn summary_stats(rows: &RowSet) -> SummaryStats {
    let mut column_stats = BTreeMap::new();

    for (idx, name) in rows.columns.iter().enumerate() {
        let values: Vec<_> = rows
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter(|v| !v.is_null())
            .collect();
        let null_count = rows.len() - values.len();
        let non_null_count = values.len();

        let numbers: Option<Vec<f64>> = values.iter().map(|v| v.as_f64()).collect();
        let summary = match numbers {
            Some(numbers) if !numbers.is_empty() => {
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
                ColumnSummary::Numeric {
                    null_count,
                    non_null_count,
                    min: Some(min),
                    max: Some(max),
                    avg: Some(avg),
                }
            }
            _ => {
                let lengths: Vec<usize> = values.iter().map(|v| v.to_text().chars().count()).collect();
                ColumnSummary::Text {
                    null_count,
                    non_null_count,
                    min_length: lengths.iter().min().copied(),
                    max_length: lengths.iter().max().copied(),
                }
            }
        };
        column_stats.insert(name.clone(), summary);
    }

    SummaryStats {
        row_count: rows.len(),
        column_count: rows.columns.len(),
        columns: rows.columns.clone(),
        column_stats,
    }
}
