//! Integration tests for the table metadata cache.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use sqlpilot::cache::SchemaMetadataCache;
use sqlpilot::ExecError;
use support::{shop_tables, FakeProvider};

const TTL: Duration = Duration::from_secs(3600);

fn cache_over(provider: FakeProvider) -> (Arc<FakeProvider>, SchemaMetadataCache) {
    let provider = Arc::new(provider);
    let cache = SchemaMetadataCache::new(provider.clone(), TTL);
    (provider, cache)
}

#[tokio::test(start_paused = true)]
async fn test_reads_within_ttl_share_one_snapshot() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    let first = cache.get_table_metadata("orders", false).await.unwrap();
    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    let second = cache.get_table_metadata("orders", false).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(provider.fetch_count("orders"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_after_ttl_reintrospects() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    let first = cache.get_table_metadata("orders", false).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    let second = cache.get_table_metadata("orders", false).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(provider.fetch_count("orders"), 2);
    // The old snapshot is untouched.
    assert_eq!(first.name, "orders");
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_bypasses_fresh_entry() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    cache.get_table_metadata("users", false).await.unwrap();
    cache.get_table_metadata("users", true).await.unwrap();

    assert_eq!(provider.fetch_count("users"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_load() {
    let provider = FakeProvider::new(shop_tables()).with_fetch_delays(vec![Duration::from_secs(5)]);
    let (provider, cache) = cache_over(provider);

    let (a, b) = tokio::join!(
        cache.get_table_metadata("orders", false),
        cache.get_table_metadata("ORDERS", false)
    );

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(provider.fetch_count("orders"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_refresh_never_overwrites_newer_snapshot() {
    let provider = FakeProvider::new(shop_tables()).with_fetch_delays(vec![Duration::from_secs(10)]);
    let (provider, cache) = cache_over(provider);

    let slow = cache.get_table_metadata("orders", true);
    let later = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cache.get_table_metadata("orders", true).await
    };
    let (slow, later) = tokio::join!(slow, later);
    let (slow, later) = (slow.unwrap(), later.unwrap());

    // The later refresh waits for the slow one, then loads again.
    assert_eq!(provider.fetch_count("orders"), 2);
    assert!(!Arc::ptr_eq(&slow, &later));
    assert!(Arc::ptr_eq(&cache.peek("orders").await.unwrap(), &later));
}

#[tokio::test(start_paused = true)]
async fn test_table_names_are_case_insensitive() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    let lower = cache.get_table_metadata("orders", false).await.unwrap();
    let upper = cache.get_table_metadata(" ORDERS ", false).await.unwrap();

    assert!(Arc::ptr_eq(&lower, &upper));
    assert_eq!(provider.fetch_count("orders"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_usage_counts_every_access() {
    let (_provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    assert!(cache.usage("users").await.is_none());
    for _ in 0..3 {
        cache.get_table_metadata("users", false).await.unwrap();
    }
    cache.get_table_metadata("users", true).await.unwrap();

    let usage = cache.usage("users").await.unwrap();
    assert_eq!(usage.access_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_row_count_is_attached() {
    let provider = FakeProvider::new(shop_tables()).with_row_count("orders", 125_000);
    let (_provider, cache) = cache_over(provider);

    let orders = cache.get_table_metadata("orders", false).await.unwrap();
    assert_eq!(orders.row_count_estimate, Some(125_000));
}

#[tokio::test(start_paused = true)]
async fn test_failed_row_count_degrades_to_unknown() {
    let provider = FakeProvider::new(shop_tables()).with_failing_count();
    let (_provider, cache) = cache_over(provider);

    let orders = cache.get_table_metadata("orders", false).await.unwrap();
    assert_eq!(orders.row_count_estimate, None);
    assert_eq!(orders.columns.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_table_is_not_found_and_not_cached() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    let err = cache.get_table_metadata("ghosts", false).await.unwrap_err();
    assert!(matches!(err, ExecError::NotFound { .. }));
    assert!(cache.cached_tables().await.is_empty());

    cache.get_table_metadata("ghosts", false).await.unwrap_err();
    assert_eq!(provider.fetch_count("ghosts"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_preload_reports_partial_failures() {
    let (_provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    let report = cache
        .preload(&["users".to_string(), "ghosts".to_string(), "orders".to_string()])
        .await;

    assert_eq!(report.tables_refreshed, 2);
    assert!(!report.is_complete());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].table, "ghosts");
    assert_eq!(report.errors[0].error.code, "NOT_FOUND");
    assert_eq!(cache.cached_tables().await, vec!["orders", "users"]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_all_reloads_every_table() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));
    cache.get_table_metadata("users", false).await.unwrap();

    let report = cache.refresh_all().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.tables_refreshed, 4);
    assert_eq!(provider.fetch_count("users"), 2);
    assert_eq!(
        cache.cached_tables().await,
        vec!["employees", "orders", "products", "users"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_peek_ignores_expired_entries() {
    let (_provider, cache) = cache_over(FakeProvider::new(shop_tables()));

    assert!(cache.peek("users").await.is_none());
    cache.get_table_metadata("users", false).await.unwrap();
    assert!(cache.peek("users").await.is_some());
    assert_eq!(cache.usage("users").await.unwrap().access_count, 1);

    tokio::time::advance(TTL).await;
    assert!(cache.peek("users").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_and_clear() {
    let (provider, cache) = cache_over(FakeProvider::new(shop_tables()));
    cache.get_table_metadata("users", false).await.unwrap();
    cache.get_table_metadata("orders", false).await.unwrap();

    assert!(cache.invalidate("USERS").await);
    assert!(!cache.invalidate("users").await);
    assert_eq!(cache.cached_tables().await, vec!["orders"]);

    cache.get_table_metadata("users", false).await.unwrap();
    assert_eq!(provider.fetch_count("users"), 2);

    cache.clear().await;
    assert!(cache.cached_tables().await.is_empty());
}
