//! Assembles product projections from the cache and the ledger.
//!
//! The cache answers plain reads whenever it can — staleness is accepted in
//! exchange for fast reads, and `sync` is the explicit escape hatch. The
//! ledger is authoritative: it is the fallback for every miss and the only
//! source `sync` trusts.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use farmchain_common::address::OwnerAddress;
use farmchain_common::product::{CacheRecord, ProductId, ProductSummary};
use farmchain_common::projection::{sort_history, ProductProjection, Provenance};

use crate::cache::CacheStore;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{LedgerClient, LedgerError, LedgerProduct};

/// Owner-scoped listing. `skipped` carries the ids that resolved from
/// neither source; the listing as a whole still succeeds when at least one
/// id resolved.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerListing {
    pub products: Vec<ProductSummary>,
    pub skipped: Vec<ProductId>,
}

pub struct ReconcileService {
    ledger: Arc<dyn LedgerClient>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl ReconcileService {
    /// `cache: None` runs the service in registry-only mode: every read goes
    /// to the ledger and nothing is persisted.
    pub fn new(ledger: Arc<dyn LedgerClient>, cache: Option<Arc<dyn CacheStore>>) -> Self {
        ReconcileService { ledger, cache }
    }

    /// Best-available projection for a product: cache hit wins outright (no
    /// freshness check), otherwise the ledger answers and the result is
    /// written back without blocking the response.
    pub async fn get_by_id(&self, id: ProductId) -> ServiceResult<ProductProjection> {
        if let Some(cache) = &self.cache {
            match cache.get(id).await {
                Ok(Some(record)) => {
                    debug!("product {id}: served from cache");
                    return Ok(projection_from_record(record));
                }
                Ok(None) => debug!("product {id}: cache miss"),
                Err(e) => warn!("product {id}: cache read failed, trying the ledger: {e}"),
            }
        }

        let fetched = self.ledger.get_history(id).await.map_err(classify)?;
        let projection = projection_from_ledger(&fetched);

        if let Some(cache) = &self.cache {
            // Fire and forget: the response never waits on the write-back,
            // and a failed write-back only costs the next read a ledger trip.
            let cache = Arc::clone(cache);
            let record = record_from_ledger(fetched, Utc::now());
            tokio::spawn(async move {
                if let Err(e) = cache.upsert(record).await {
                    warn!("product {id}: cache write-back failed: {e}");
                }
            });
        }

        Ok(projection)
    }

    /// Summaries for every product an address owns. The id set always comes
    /// from the ledger; each id then resolves preferring the cache. An id
    /// that resolves from neither source is skipped, not fatal — the call
    /// only fails when nothing resolves at all.
    pub async fn get_by_owner(&self, address: &str) -> ServiceResult<OwnerListing> {
        let owner = OwnerAddress::parse(address).map_err(ServiceError::Validation)?;
        let ids = self.ledger.get_owned_ids(&owner).await.map_err(classify)?;
        if ids.is_empty() {
            return Ok(OwnerListing {
                products: Vec::new(),
                skipped: Vec::new(),
            });
        }

        // One batch probe against the cache, then per-id ledger fallback.
        let mut cached: BTreeMap<u64, CacheRecord> = BTreeMap::new();
        if let Some(cache) = &self.cache {
            match cache.find_by_ids(&ids).await {
                Ok(records) => {
                    cached = records.into_iter().map(|r| (r.product.id.0, r)).collect();
                }
                Err(e) => warn!("owner {owner}: cache probe failed: {e}"),
            }
        }

        let mut products = Vec::with_capacity(ids.len());
        let mut skipped = Vec::new();
        for id in &ids {
            if let Some(record) = cached.get(&id.0) {
                products.push(record.summary());
                continue;
            }
            match self.ledger.get_history(*id).await {
                Ok(fetched) => products.push(ProductSummary::from_product(&fetched.product)),
                Err(e) => {
                    warn!("owner {owner}: product {id} unresolvable, skipping: {e}");
                    skipped.push(*id);
                }
            }
        }

        if products.is_empty() {
            return Err(ServiceError::UpstreamUnavailable(format!(
                "none of the {} products owned by {owner} could be resolved",
                ids.len()
            )));
        }
        Ok(OwnerListing { products, skipped })
    }

    /// Force a ledger read and overwrite the cached record wholesale —
    /// scalar fields and history together. Replacing rather than merging is
    /// what keeps the cache a subset of ledger truth: a merge could retain
    /// an entry the ledger no longer vouches for. On ledger failure the
    /// cache is left untouched.
    pub async fn sync(&self, id: ProductId) -> ServiceResult<ProductProjection> {
        let fetched = self.ledger.get_history(id).await.map_err(classify)?;
        let projection = projection_from_ledger(&fetched);

        match &self.cache {
            Some(cache) => {
                let record = record_from_ledger(fetched, Utc::now());
                match cache.upsert(record).await {
                    Ok(_) => info!("product {id}: synced from ledger"),
                    Err(e) => warn!("product {id}: sync fetched but persisted nothing: {e}"),
                }
            }
            None => warn!("product {id}: cache disabled, sync returns without persisting"),
        }

        Ok(projection)
    }

    /// Recent cache records, newest first. Purely cache-scoped operational
    /// visibility; with the cache disabled this is always empty.
    pub async fn list_recent(&self, limit: usize) -> ServiceResult<Vec<ProductSummary>> {
        let Some(cache) = &self.cache else {
            return Ok(Vec::new());
        };
        let records = cache
            .list_recent(limit)
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;
        Ok(records.iter().map(CacheRecord::summary).collect())
    }
}

fn classify(e: LedgerError) -> ServiceError {
    match e {
        LedgerError::NotFound => ServiceError::NotFound,
        LedgerError::Transport(msg) => ServiceError::UpstreamUnavailable(msg),
    }
}

fn projection_from_record(record: CacheRecord) -> ProductProjection {
    let mut history = record.history;
    sort_history(&mut history);
    ProductProjection {
        product: record.product,
        history,
        provenance: Provenance::Cache,
    }
}

fn projection_from_ledger(fetched: &LedgerProduct) -> ProductProjection {
    let mut history = fetched.events.clone();
    sort_history(&mut history);
    ProductProjection {
        product: fetched.product.clone(),
        history,
        provenance: Provenance::Ledger,
    }
}

fn record_from_ledger(fetched: LedgerProduct, now: DateTime<Utc>) -> CacheRecord {
    CacheRecord {
        product: fetched.product,
        history: fetched.events,
        source_ref: None,
        created_at: now,
        updated_at: now,
    }
}
