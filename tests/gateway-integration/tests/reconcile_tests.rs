//! Reconciliation behavior against a stub registry: cache-first reads,
//! ledger fallback, forced sync, and owner listings with partial results.

use std::time::Duration;

use farmchain_common::product::ProductId;
use farmchain_common::projection::Provenance;
use farmchain_common::time::datetime_to_epoch_seconds;
use farmchain_gateway::cache::CacheStore;
use farmchain_gateway::error::ServiceError;

use gateway_integration::harness::{cached_harness, cacheless_harness};
use gateway_integration::{history_event, ledger_product, wait_for};

const HARVEST: i64 = 1_705_276_800; // 2024-01-15T00:00:00Z

#[tokio::test]
async fn ledger_only_product_resolves_with_ledger_provenance() {
    let h = cached_harness();
    h.ledger
        .insert(ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc"));

    let projection = h.service.get_by_id(ProductId(7)).await.unwrap();
    assert_eq!(projection.provenance, Provenance::Ledger);
    assert_eq!(projection.product.name, "Tomatoes");
    assert_eq!(projection.product.quantity, 100);
    assert_eq!(projection.product.owner.as_str(), "0xabc");
    assert_eq!(
        datetime_to_epoch_seconds(projection.product.harvest_date),
        HARVEST
    );
}

#[tokio::test]
async fn ledger_read_writes_back_without_blocking_the_response() {
    let h = cached_harness();
    h.ledger
        .insert(ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc"));
    h.service.get_by_id(ProductId(7)).await.unwrap();

    let cache = h.cache.clone();
    let landed = wait_for(Duration::from_secs(2), || {
        let cache = cache.clone();
        async move { cache.get(ProductId(7)).await.unwrap().is_some() }
    })
    .await;
    assert!(landed, "write-back never reached the cache");

    // The next read is a cache hit: the ledger is not consulted again.
    let before = h.ledger.history_call_count();
    let projection = h.service.get_by_id(ProductId(7)).await.unwrap();
    assert_eq!(projection.provenance, Provenance::Cache);
    assert_eq!(h.ledger.history_call_count(), before);
}

#[tokio::test]
async fn cached_product_is_served_without_any_ledger_call() {
    let h = cached_harness();
    h.ledger
        .insert(ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc"));
    h.service.sync(ProductId(7)).await.unwrap();

    let before = h.ledger.history_call_count();
    let projection = h.service.get_by_id(ProductId(7)).await.unwrap();
    assert_eq!(projection.provenance, Provenance::Cache);
    assert_eq!(h.ledger.history_call_count(), before);
}

#[tokio::test]
async fn stale_cache_wins_plain_reads_until_sync() {
    let h = cached_harness();
    h.ledger
        .insert(ledger_product(7, "Stale", 100, HARVEST, "0xabc"));
    h.service.sync(ProductId(7)).await.unwrap();

    // The ledger moves on; the cache does not know yet.
    h.ledger
        .insert(ledger_product(7, "Fresh", 100, HARVEST, "0xabc"));

    let plain = h.service.get_by_id(ProductId(7)).await.unwrap();
    assert_eq!(plain.product.name, "Stale");
    assert_eq!(plain.provenance, Provenance::Cache);

    let synced = h.service.sync(ProductId(7)).await.unwrap();
    assert_eq!(synced.product.name, "Fresh");
    assert_eq!(synced.provenance, Provenance::Ledger);

    let after = h.service.get_by_id(ProductId(7)).await.unwrap();
    assert_eq!(after.product.name, "Fresh");
    assert_eq!(after.provenance, Provenance::Cache);
}

#[tokio::test]
async fn sync_issues_one_read_and_one_upsert() {
    let h = cached_harness();
    h.ledger
        .insert(ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc"));

    h.service.sync(ProductId(7)).await.unwrap();
    assert_eq!(h.ledger.history_call_count(), 1);
    assert_eq!(h.cache.upsert_count(), 1);
}

#[tokio::test]
async fn failed_sync_leaves_the_cache_untouched() {
    let h = cached_harness();
    h.ledger
        .insert(ledger_product(7, "Stale", 100, HARVEST, "0xabc"));
    h.service.sync(ProductId(7)).await.unwrap();
    assert_eq!(h.cache.upsert_count(), 1);

    h.ledger.set_failing(true);
    let err = h.service.sync(ProductId(7)).await.unwrap_err();
    assert!(matches!(err, ServiceError::UpstreamUnavailable(_)));

    assert_eq!(h.cache.upsert_count(), 1);
    let cached = h.cache.get(ProductId(7)).await.unwrap().unwrap();
    assert_eq!(cached.product.name, "Stale");
}

#[tokio::test]
async fn sync_replaces_cached_history_with_ledger_truth() {
    let h = cached_harness();
    let mut record = ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc");
    record.events.push(history_event("created", "", 100));
    record.events.push(history_event("shipped", "", 200));
    h.ledger.insert(record);
    h.service.sync(ProductId(7)).await.unwrap();

    // The ledger now returns fewer events; the cache must not keep the rest.
    let mut shorter = ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc");
    shorter.events.push(history_event("created", "", 100));
    h.ledger.insert(shorter);
    h.service.sync(ProductId(7)).await.unwrap();

    let cached = h.cache.get(ProductId(7)).await.unwrap().unwrap();
    assert_eq!(cached.history.len(), 1);
    assert_eq!(cached.history[0].status, "created");
}

#[tokio::test]
async fn projection_history_is_sorted_and_stable() {
    let h = cached_harness();
    let mut record = ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc");
    record.events.push(history_event("late", "", 300));
    record.events.push(history_event("tie-a", "", 100));
    record.events.push(history_event("tie-b", "", 100));
    h.ledger.insert(record);

    let projection = h.service.get_by_id(ProductId(7)).await.unwrap();
    let statuses: Vec<&str> = projection
        .history
        .iter()
        .map(|e| e.status.as_str())
        .collect();
    assert_eq!(statuses, ["tie-a", "tie-b", "late"]);
}

#[tokio::test]
async fn absent_everywhere_is_not_found() {
    let h = cached_harness();
    let err = h.service.get_by_id(ProductId(999)).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound));
}

#[tokio::test]
async fn ledger_outage_with_empty_cache_is_upstream_unavailable() {
    let h = cached_harness();
    h.ledger.set_failing(true);

    let err = h.service.get_by_id(ProductId(1)).await.unwrap_err();
    assert!(matches!(err, ServiceError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn owner_listing_skips_unresolvable_ids() {
    let h = cached_harness();
    h.ledger.insert(ledger_product(3, "Corn", 5, HARVEST, "0xdef"));
    h.ledger.set_owned("0xDEF", &[3, 4]);

    // Mixed-case input: normalization is what makes the lookup land.
    let listing = h.service.get_by_owner("0xDEF").await.unwrap();
    assert_eq!(listing.products.len(), 1);
    assert_eq!(listing.products[0].id, ProductId(3));
    assert_eq!(listing.skipped, vec![ProductId(4)]);
}

#[tokio::test]
async fn owner_listing_fails_only_when_nothing_resolves() {
    let h = cached_harness();
    h.ledger.set_owned("0xdef", &[3, 4]);

    let err = h.service.get_by_owner("0xdef").await.unwrap_err();
    assert!(matches!(err, ServiceError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn owner_with_no_products_gets_an_empty_listing() {
    let h = cached_harness();
    let listing = h.service.get_by_owner("0xdef").await.unwrap();
    assert!(listing.products.is_empty());
    assert!(listing.skipped.is_empty());
}

#[tokio::test]
async fn owner_listing_prefers_cached_summaries() {
    let h = cached_harness();
    h.ledger.insert(ledger_product(3, "Corn", 5, HARVEST, "0xdef"));
    h.ledger.set_owned("0xdef", &[3]);
    h.service.sync(ProductId(3)).await.unwrap();

    let before = h.ledger.history_call_count();
    let listing = h.service.get_by_owner("0xdef").await.unwrap();
    assert_eq!(listing.products.len(), 1);
    assert!(listing.products[0].created_at.is_some());
    assert_eq!(h.ledger.history_call_count(), before);
}

#[tokio::test]
async fn malformed_owner_address_is_rejected_before_the_ledger() {
    let h = cached_harness();
    let err = h.service.get_by_owner("garbage").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(h.ledger.owned_call_count(), 0);
}

#[tokio::test]
async fn list_recent_is_cache_scoped_and_newest_first() {
    let h = cached_harness();
    h.ledger.insert(ledger_product(1, "First", 1, HARVEST, "0xabc"));
    h.ledger.insert(ledger_product(2, "Second", 2, HARVEST, "0xabc"));
    h.service.sync(ProductId(1)).await.unwrap();
    h.service.sync(ProductId(2)).await.unwrap();

    let recent = h.service.list_recent(50).await.unwrap();
    assert_eq!(recent.len(), 2);

    let capped = h.service.list_recent(1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn registry_only_mode_always_reads_the_ledger() {
    let (ledger, service) = cacheless_harness();
    ledger.insert(ledger_product(7, "Tomatoes", 100, HARVEST, "0xabc"));

    let first = service.get_by_id(ProductId(7)).await.unwrap();
    let second = service.get_by_id(ProductId(7)).await.unwrap();
    assert_eq!(first.provenance, Provenance::Ledger);
    assert_eq!(second.provenance, Provenance::Ledger);
    assert_eq!(ledger.history_call_count(), 2);

    assert!(service.list_recent(50).await.unwrap().is_empty());

    // Sync still answers from the ledger; there is just nowhere to persist.
    let synced = service.sync(ProductId(7)).await.unwrap();
    assert_eq!(synced.provenance, Provenance::Ledger);
}
