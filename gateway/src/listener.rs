//! Background mirroring of ledger creation notifications into the cache.
//!
//! Advisory, not authoritative: a lost notification only delays cache
//! freshness, because plain reads fall back to the ledger. Duplicate
//! notifications are harmless — creation fields are immutable, so the upsert
//! rewrites the same values.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use farmchain_common::product::{CacheRecord, Product};

use crate::cache::CacheStore;
use crate::ledger::{LedgerClient, LedgerError, ProductCreated};

/// Handle to the running listener task. The task owns the subscription for
/// the life of the process; [`EventListener::shutdown`] ends it without
/// cutting off an upsert that has already started.
pub struct EventListener {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl EventListener {
    pub async fn spawn(
        ledger: Arc<dyn LedgerClient>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<EventListener, LedgerError> {
        let mut events = ledger.subscribe_created().await?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("creation listener: shutting down");
                        break;
                    }
                    event = events.next() => {
                        match event {
                            // The upsert runs in the arm body, after the
                            // select has resolved, so a shutdown signal can
                            // no longer cancel it mid-write.
                            Some(event) => upsert_created(cache.as_ref(), event).await,
                            None => {
                                info!("creation listener: subscription closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(EventListener { shutdown, handle })
    }

    /// Signal shutdown and wait for the task, including any in-flight
    /// upsert, to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("creation listener: task join failed: {e}");
        }
    }
}

/// Mirror one creation notification. Creation events carry no history, so an
/// existing record's entries (and any other fields a fuller source wrote) are
/// carried over rather than wiped — the notification is a scalar-field
/// rewrite keyed by id.
async fn upsert_created(cache: &dyn CacheStore, event: ProductCreated) {
    let id = event.id;
    let now = Utc::now();

    let mut record = CacheRecord {
        product: Product {
            id: event.id,
            name: event.name,
            quantity: event.quantity,
            harvest_date: event.harvest_date,
            owner: event.owner,
        },
        history: Vec::new(),
        source_ref: Some(event.transaction_ref),
        created_at: now,
        updated_at: now,
    };

    match cache.get(id).await {
        Ok(Some(existing)) => record.history = existing.history,
        Ok(None) => {}
        Err(e) => warn!("creation listener: pre-upsert read failed for product {id}: {e}"),
    }

    match cache.upsert(record).await {
        Ok(_) => info!("creation listener: product {id} mirrored to cache"),
        Err(e) => warn!("creation listener: failed to mirror product {id}: {e}"),
    }
}
