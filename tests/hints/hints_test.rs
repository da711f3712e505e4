//! Integration tests for query hints.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use sqlpilot::cache::SchemaMetadataCache;
use sqlpilot::config::HintSettings;
use sqlpilot::hints::{IndexSuggestion, Optimization, QueryHintGenerator, QueryHints, QueryIssue};
use sqlpilot::schema::{ColumnDescriptor, TableMetadata};
use support::{shop_tables, FakeProvider};

fn generator(provider: FakeProvider) -> QueryHintGenerator {
    let schema = SchemaMetadataCache::new(Arc::new(provider), Duration::from_secs(3600));
    QueryHintGenerator::new(Arc::new(schema), HintSettings::default())
}

fn wide_table(columns: usize) -> TableMetadata {
    (0..columns).fold(TableMetadata::new("events"), |table, i| {
        table.with_column(ColumnDescriptor::new(format!("c{}", i), "TEXT"))
    })
}

fn index_pairs(hints: &QueryHints) -> Vec<(&str, &str)> {
    hints
        .suggested_indices
        .iter()
        .map(|s| (s.table.as_str(), s.column.as_str()))
        .collect()
}

#[tokio::test]
async fn test_limit_without_order_by() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("SELECT * FROM orders LIMIT 10")
        .await;

    assert_eq!(hints.tables_referenced, vec!["orders"]);
    assert_eq!(
        hints.potential_issues,
        vec![QueryIssue::MissingOrderBy {
            message: "LIMIT without ORDER BY returns an arbitrary subset of rows".to_string()
        }]
    );
    assert!(hints.optimization_suggestions.is_empty());
}

#[tokio::test]
async fn test_limit_with_order_by_is_fine() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("SELECT id FROM orders ORDER BY id DESC LIMIT 10")
        .await;

    assert!(hints.potential_issues.is_empty());
}

#[tokio::test]
async fn test_unknown_tables_are_reported() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("SELECT * FROM invoices i JOIN orders o ON o.id = i.order_id")
        .await;

    assert_eq!(hints.tables_referenced, vec!["invoices", "orders"]);
    match &hints.potential_issues[..] {
        [QueryIssue::UnknownTables { tables, message }] => {
            assert_eq!(tables, &vec!["invoices".to_string()]);
            assert!(message.contains("invoices"));
        }
        other => panic!("unexpected issues: {:?}", other),
    }
}

#[tokio::test]
async fn test_lookup_timeout_is_not_an_unknown_table() {
    let provider = FakeProvider::new(shop_tables()).with_timeout("orders");
    let hints = generator(provider)
        .hints("SELECT o.id, u.email FROM orders o JOIN users u ON u.id = o.customer_id WHERE o.status = 'x' AND u.signup_date > '2024-01-01'")
        .await;

    assert_eq!(hints.tables_referenced, vec!["orders", "users"]);
    assert!(hints.potential_issues.is_empty());
    // Only the table that could be read gets hints.
    assert_eq!(index_pairs(&hints), vec![("users", "signup_date")]);
}

#[tokio::test]
async fn test_unindexed_filter_columns() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("SELECT id FROM orders WHERE status = 'paid' AND customer_id = 3")
        .await;

    assert_eq!(
        hints.suggested_indices,
        vec![IndexSuggestion {
            table: "orders".to_string(),
            column: "status".to_string(),
            reason: "orders.status is filtered on but not covered by an index".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_aliases_resolve_filter_columns() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints(
            "SELECT o.id FROM orders o JOIN users u ON u.id = o.customer_id \
             WHERE u.signup_date > '2024-01-01' AND o.status = 'new' AND u.email LIKE '%@example.com'",
        )
        .await;

    assert_eq!(
        index_pairs(&hints),
        vec![("users", "signup_date"), ("orders", "status")]
    );
}

#[tokio::test]
async fn test_unknown_columns_are_ignored() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("SELECT id FROM orders WHERE coupon = 'X' AND id = 4")
        .await;

    assert!(hints.suggested_indices.is_empty());
}

#[tokio::test]
async fn test_pagination_for_large_tables() {
    let provider = FakeProvider::new(shop_tables())
        .with_row_count("orders", 50_000)
        .with_row_count("users", 500);
    let generator = generator(provider);

    let hints = generator
        .hints("SELECT o.id, u.email FROM orders o JOIN users u ON u.id = o.customer_id")
        .await;
    match &hints.optimization_suggestions[..] {
        [Optimization::Pagination {
            table,
            row_count_estimate,
            ..
        }] => {
            assert_eq!(table, "orders");
            assert_eq!(*row_count_estimate, 50_000);
        }
        other => panic!("unexpected suggestions: {:?}", other),
    }

    let hints = generator.hints("SELECT id FROM orders LIMIT 100").await;
    assert!(hints.optimization_suggestions.is_empty());
}

#[tokio::test]
async fn test_select_star_on_wide_tables() {
    let hints = generator(FakeProvider::new(vec![wide_table(12)]))
        .hints("SELECT * FROM events")
        .await;

    assert_eq!(
        hints.optimization_suggestions,
        vec![Optimization::SelectStar {
            table: "events".to_string(),
            column_count: 12,
            message: "events has 12 columns; select only the columns you need".to_string(),
        }]
    );

    let narrow = generator(FakeProvider::new(vec![wide_table(10)]))
        .hints("SELECT * FROM events")
        .await;
    assert!(narrow.optimization_suggestions.is_empty());
}

#[tokio::test]
async fn test_unparseable_sql_yields_empty_hints() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("this is not sql")
        .await;

    assert_eq!(hints, QueryHints::default());
}

#[tokio::test]
async fn test_hints_serialize_with_type_tags() {
    let hints = generator(FakeProvider::new(shop_tables()))
        .hints("SELECT * FROM ghosts LIMIT 1")
        .await;

    let json = serde_json::to_value(&hints).unwrap();
    assert_eq!(json["potential_issues"][0]["type"], "unknown_tables");
    assert_eq!(json["potential_issues"][1]["type"], "missing_order_by");
}
