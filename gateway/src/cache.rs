//! Document store for product mirror records.
//!
//! The cache is advisory: it accelerates reads and is rebuilt from the ledger
//! at any time. The daemon also runs with no cache at all, so everything here
//! is behind the [`CacheStore`] trait and optional at the call sites.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use farmchain_common::product::{CacheRecord, ProductId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Keyed-by-product-id document store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, id: ProductId) -> CacheResult<Option<CacheRecord>>;

    /// Insert-or-replace by product id. A replaced record keeps its original
    /// `created_at`; everything else comes from the new record. Returns the
    /// record as stored.
    async fn upsert(&self, record: CacheRecord) -> CacheResult<CacheRecord>;

    /// Most recently created records first, at most `limit`.
    async fn list_recent(&self, limit: usize) -> CacheResult<Vec<CacheRecord>>;

    /// Records for the given ids, in no particular order. Ids with no record
    /// are simply absent from the result.
    async fn find_by_ids(&self, ids: &[ProductId]) -> CacheResult<Vec<CacheRecord>>;
}

fn upsert_into(records: &mut BTreeMap<u64, CacheRecord>, mut record: CacheRecord) -> CacheRecord {
    if let Some(existing) = records.get(&record.product.id.0) {
        record.created_at = existing.created_at;
    }
    records.insert(record.product.id.0, record.clone());
    record
}

fn recent(records: &BTreeMap<u64, CacheRecord>, limit: usize) -> Vec<CacheRecord> {
    let mut all: Vec<CacheRecord> = records.values().cloned().collect();
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    all.truncate(limit);
    all
}

// ─── In-memory store ─────────────────────────────────────────────────────────

/// In-memory store. Used by tests and by deployments that want the cache as a
/// per-process accelerator without durability.
#[derive(Default)]
pub struct MemoryCache {
    records: RwLock<BTreeMap<u64, CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, id: ProductId) -> CacheResult<Option<CacheRecord>> {
        Ok(self.records.read().await.get(&id.0).cloned())
    }

    async fn upsert(&self, record: CacheRecord) -> CacheResult<CacheRecord> {
        let mut records = self.records.write().await;
        Ok(upsert_into(&mut records, record))
    }

    async fn list_recent(&self, limit: usize) -> CacheResult<Vec<CacheRecord>> {
        Ok(recent(&*self.records.read().await, limit))
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> CacheResult<Vec<CacheRecord>> {
        let records = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&id.0).cloned())
            .collect())
    }
}

// ─── File-backed store ───────────────────────────────────────────────────────

/// File-backed store: one JSON document holding every record, loaded at open
/// and rewritten after each upsert. The in-memory map is the operative copy;
/// the file write is best-effort, so a full disk degrades durability but
/// never fails a request.
pub struct JsonFileCache {
    path: PathBuf,
    records: RwLock<BTreeMap<u64, CacheRecord>>,
}

impl JsonFileCache {
    /// Load the store from `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> CacheResult<JsonFileCache> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(JsonFileCache {
            path,
            records: RwLock::new(records),
        })
    }

    /// Default location under the platform cache directory.
    pub fn default_path() -> PathBuf {
        let cache = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        cache.join("farmchain").join("products.json")
    }

    fn persist(path: &Path, records: &BTreeMap<u64, CacheRecord>) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(records)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for JsonFileCache {
    async fn get(&self, id: ProductId) -> CacheResult<Option<CacheRecord>> {
        Ok(self.records.read().await.get(&id.0).cloned())
    }

    async fn upsert(&self, record: CacheRecord) -> CacheResult<CacheRecord> {
        let mut records = self.records.write().await;
        let stored = upsert_into(&mut records, record);
        if let Err(e) = JsonFileCache::persist(&self.path, &records) {
            warn!("cache: failed to persist {}: {e}", self.path.display());
        }
        Ok(stored)
    }

    async fn list_recent(&self, limit: usize) -> CacheResult<Vec<CacheRecord>> {
        Ok(recent(&*self.records.read().await, limit))
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> CacheResult<Vec<CacheRecord>> {
        let records = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&id.0).cloned())
            .collect())
    }
}
