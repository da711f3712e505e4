//! Table-name inflection for naming-convention joins.
//!
//! `inflector` handles regular English plurals; schema nouns that it gets
//! wrong are listed explicitly.

use inflector::Inflector;

/// Plural table names whose singular `inflector` does not produce.
static IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("criteria", "criterion"),
    ("analyses", "analysis"),
    ("indices", "index"),
    ("matrices", "matrix"),
    ("vertices", "vertex"),
    ("statuses", "status"),
    ("addresses", "address"),
];

/// Singular form of a table name.
///
/// Only the last `_` segment is inflected, so `order_items` becomes
/// `order_item`. Case is folded to lowercase.
pub fn singular_table_name(table: &str) -> String {
    let lower = table.trim().to_lowercase();
    let (head, last) = match lower.rfind('_') {
        Some(pos) => lower.split_at(pos + 1),
        None => ("", lower.as_str()),
    };
    if last.is_empty() {
        return lower;
    }

    let singular = IRREGULAR
        .iter()
        .find(|(plural, _)| *plural == last)
        .map(|(_, singular)| singular.to_string())
        .unwrap_or_else(|| last.to_singular());
    format!("{}{}", head, singular)
}

/// Foreign-key column names a table is conventionally referenced by, with
/// the confidence of each convention: `<table>_id` first, then the singular
/// `<singular>_id` when it differs.
pub fn reference_column_names(table: &str) -> Vec<(String, f64)> {
    let lower = table.trim().to_lowercase();
    let mut names = vec![(format!("{}_id", lower), 0.9)];
    let singular = singular_table_name(&lower);
    if singular != lower {
        names.push((format!("{}_id", singular), 0.8));
    }
    names
}
