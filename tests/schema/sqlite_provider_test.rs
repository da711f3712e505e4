//! Integration tests for SQLite schema introspection.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use sqlpilot::backend::SqliteConnector;
use sqlpilot::config::Settings;
use sqlpilot::execution::QueryExecutor;
use sqlpilot::pool::PoolManager;
use sqlpilot::schema::{ColumnKind, SchemaProvider, SqliteSchemaProvider};
use sqlpilot::ExecError;
use support::shop_db;

fn provider(settings: &Settings) -> SqliteSchemaProvider {
    let pools = PoolManager::new(Arc::new(SqliteConnector), settings.database.clone());
    let executor = QueryExecutor::new(Arc::new(pools), settings.services.execution.clone());
    SqliteSchemaProvider::new(Arc::new(executor))
}

#[tokio::test]
async fn test_list_tables_is_sorted() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let tables = provider.list_tables().await.unwrap();
    assert_eq!(tables, vec!["order_items", "orders", "products", "users"]);
}

#[tokio::test]
async fn test_columns_and_primary_key() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let users = provider.get_table("users").await.unwrap();
    let names: Vec<&str> = users.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "signup_date"]);
    assert_eq!(users.primary_keys, vec!["id"]);

    let id = users.column("id").unwrap();
    assert!(id.is_primary_key);
    assert!(id.is_autoincrement);
    assert!(!id.nullable);
    assert_eq!(id.kind, ColumnKind::Integer);

    let email = users.column("email").unwrap();
    assert!(!email.nullable);
    assert_eq!(email.kind, ColumnKind::Text);

    let signup = users.column("signup_date").unwrap();
    assert!(signup.nullable);
    assert_eq!(signup.kind, ColumnKind::Date);
}

#[tokio::test]
async fn test_declared_types_and_defaults() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let products = provider.get_table("products").await.unwrap();
    let name = products.column("name").unwrap();
    assert_eq!(name.data_type, "VARCHAR(80)");
    assert_eq!(name.kind, ColumnKind::Text);
    assert_eq!(products.column("price").unwrap().kind, ColumnKind::Decimal);

    let orders = provider.get_table("orders").await.unwrap();
    assert_eq!(orders.column("status").unwrap().default.as_deref(), Some("'new'"));
    assert_eq!(orders.column("placed_at").unwrap().kind, ColumnKind::Timestamp);
}

#[tokio::test]
async fn test_composite_primary_key_is_not_autoincrement() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let items = provider.get_table("order_items").await.unwrap();
    assert_eq!(items.primary_keys, vec!["order_id", "product_id"]);
    assert!(items.columns.iter().all(|c| !c.is_autoincrement));
}

#[tokio::test]
async fn test_foreign_keys() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let orders = provider.get_table("orders").await.unwrap();
    assert_eq!(orders.foreign_keys.len(), 1);
    let fk = &orders.foreign_keys[0];
    assert_eq!(fk.referred_table, "users");
    assert_eq!(fk.local_columns, vec!["customer_id"]);
    assert_eq!(fk.referred_columns, vec!["id"]);

    let items = provider.get_table("order_items").await.unwrap();
    let to_products = items
        .foreign_keys
        .iter()
        .find(|fk| fk.referred_table == "products")
        .unwrap();
    // Declared without columns: resolved to the referred primary key.
    assert_eq!(to_products.local_columns, vec!["product_id"]);
    assert_eq!(to_products.referred_columns, vec!["id"]);

    let to_orders = items
        .foreign_keys
        .iter()
        .find(|fk| fk.referred_table == "orders")
        .unwrap();
    assert_eq!(to_orders.local_columns, vec!["order_id"]);
}

#[tokio::test]
async fn test_indices() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let orders = provider.get_table("orders").await.unwrap();
    let idx = orders
        .indices
        .iter()
        .find(|i| i.name == "idx_orders_customer")
        .unwrap();
    assert!(!idx.unique);
    assert_eq!(idx.columns, vec!["customer_id"]);
    assert!(orders.is_indexed("customer_id"));
    assert!(!orders.is_indexed("status"));

    let users = provider.get_table("users").await.unwrap();
    assert!(users
        .indices
        .iter()
        .any(|i| i.unique && i.columns == vec!["email".to_string()]));
}

#[tokio::test]
async fn test_table_lookup_is_case_insensitive() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let orders = provider.get_table("ORDERS").await.unwrap();
    assert_eq!(orders.name, "orders");
}

#[tokio::test]
async fn test_missing_table_is_not_found() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    let err = provider.get_table("invoices").await.unwrap_err();
    match err {
        ExecError::NotFound { table, column } => {
            assert_eq!(table, "invoices");
            assert!(column.is_none());
        }
        other => panic!("expected not found, got {:?}", other),
    }
}

#[tokio::test]
async fn test_count_rows() {
    let (_dir, settings) = shop_db();
    let provider = provider(&settings);

    assert_eq!(provider.count_rows("users").await.unwrap(), 3);
    assert_eq!(provider.count_rows("order_items").await.unwrap(), 4);
}
