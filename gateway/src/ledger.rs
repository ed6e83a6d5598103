//! Client boundary to the external product registry.
//!
//! The registry is an append-only ledger reached over HTTP/JSON, with a
//! WebSocket stream for creation notifications. Reads are eventually
//! consistent and notifications are delivered at least once; callers own
//! deduplication and fallback.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use farmchain_common::address::OwnerAddress;
use farmchain_common::product::{HistoryEntry, Product, ProductId};
use farmchain_common::time::epoch_seconds_to_datetime;

/// Errors from the registry. No call is retried internally; a failure
/// surfaces immediately.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("product not recorded on the ledger")]
    NotFound,
    #[error("ledger transport: {0}")]
    Transport(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Opaque reference to a ledger transaction, used for audit and dedup.
pub type TransactionRef = String;

/// A full product record as the ledger returns it: the scalar fields plus
/// every lifecycle event recorded so far, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerProduct {
    pub product: Product,
    pub events: Vec<HistoryEntry>,
}

/// A `ProductCreated` notification from the ledger's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub id: ProductId,
    pub name: String,
    pub quantity: u64,
    pub harvest_date: DateTime<Utc>,
    pub owner: OwnerAddress,
    pub transaction_ref: TransactionRef,
}

/// Cancellable stream of creation notifications. Dropping it ends the
/// subscription; the transport task notices the closed channel and stops.
pub struct CreatedEvents {
    rx: mpsc::Receiver<ProductCreated>,
}

impl CreatedEvents {
    pub fn new(rx: mpsc::Receiver<ProductCreated>) -> CreatedEvents {
        CreatedEvents { rx }
    }

    /// Next notification, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<ProductCreated> {
        self.rx.recv().await
    }
}

/// Capability boundary to the external append-only product registry.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Full record for a product: scalar fields plus its recorded events.
    async fn get_history(&self, id: ProductId) -> LedgerResult<LedgerProduct>;

    /// Ids owned by an address, in ledger order (not chronological).
    async fn get_owned_ids(&self, owner: &OwnerAddress) -> LedgerResult<Vec<ProductId>>;

    /// Register a new product. The ledger assigns and returns the id.
    async fn create_product(
        &self,
        name: &str,
        quantity: u64,
        harvest_date_epoch: i64,
    ) -> LedgerResult<ProductId>;

    /// Append a lifecycle event to an existing product.
    async fn append_update(
        &self,
        id: ProductId,
        status: &str,
        payload: &str,
    ) -> LedgerResult<TransactionRef>;

    /// Subscribe to creation notifications.
    async fn subscribe_created(&self) -> LedgerResult<CreatedEvents>;
}

// ─── Wire format ─────────────────────────────────────────────────────────────

/// Product record as serialized by the registry node. Dates are epoch
/// seconds; history travels as parallel per-event arrays.
#[derive(Debug, Deserialize)]
struct WireProduct {
    id: u64,
    name: String,
    quantity: u64,
    harvest_date: i64,
    owner: String,
    #[serde(default)]
    statuses: Vec<String>,
    #[serde(default)]
    payloads: Vec<String>,
    #[serde(default)]
    timestamps: Vec<i64>,
}

impl WireProduct {
    fn into_record(self) -> Result<LedgerProduct, String> {
        let harvest_date = epoch_seconds_to_datetime(self.harvest_date)
            .ok_or_else(|| format!("product {}: harvest_date out of range", self.id))?;
        let owner = OwnerAddress::parse(&self.owner)
            .map_err(|e| format!("product {}: {e}", self.id))?;

        let product = Product {
            id: ProductId(self.id),
            name: self.name,
            quantity: self.quantity,
            harvest_date,
            owner,
        };
        product.validate()?;

        // The arrays are parallel; a well-behaved registry keeps them the
        // same length. Truncate to the shortest rather than failing the
        // whole read over a ragged tail.
        let len = self
            .statuses
            .len()
            .min(self.payloads.len())
            .min(self.timestamps.len());
        if len < self.statuses.len() || len < self.timestamps.len() || len < self.payloads.len() {
            warn!(
                "product {}: ragged history arrays ({}/{}/{}), truncating to {len}",
                self.id,
                self.statuses.len(),
                self.payloads.len(),
                self.timestamps.len()
            );
        }

        let mut events = Vec::with_capacity(len);
        for i in 0..len {
            let timestamp = epoch_seconds_to_datetime(self.timestamps[i])
                .ok_or_else(|| format!("product {}: event {i} timestamp out of range", self.id))?;
            events.push(HistoryEntry {
                status: self.statuses[i].clone(),
                payload: self.payloads[i].clone(),
                timestamp,
                source_ref: None,
            });
        }

        Ok(LedgerProduct { product, events })
    }
}

/// Creation notification as serialized on the event stream.
#[derive(Debug, Deserialize)]
struct WireCreated {
    id: u64,
    name: String,
    quantity: u64,
    harvest_date: i64,
    owner: String,
    transaction_ref: String,
}

impl WireCreated {
    fn into_event(self) -> Result<ProductCreated, String> {
        let harvest_date = epoch_seconds_to_datetime(self.harvest_date)
            .ok_or_else(|| format!("created event {}: harvest_date out of range", self.id))?;
        let owner = OwnerAddress::parse(&self.owner)
            .map_err(|e| format!("created event {}: {e}", self.id))?;
        Ok(ProductCreated {
            id: ProductId(self.id),
            name: self.name,
            quantity: self.quantity,
            harvest_date,
            owner,
            transaction_ref: self.transaction_ref,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireCreateResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WireUpdateResponse {
    transaction_ref: String,
}

// ─── HTTP client ─────────────────────────────────────────────────────────────

/// HTTP/JSON client for a registry node.
pub struct HttpLedgerClient {
    base_url: String,
    ws_url: String,
    http: reqwest::Client,
}

impl HttpLedgerClient {
    /// `base_url` is the node's HTTP base (e.g. `http://localhost:8545`).
    /// The event-stream URL is derived from it unless given explicitly.
    pub fn new(base_url: &str, ws_url: Option<&str>) -> HttpLedgerClient {
        let base_url = base_url.trim_end_matches('/').to_string();
        let ws_url = ws_url
            .map(str::to_string)
            .unwrap_or_else(|| derive_ws_url(&base_url));
        HttpLedgerClient {
            base_url,
            ws_url,
            http: reqwest::Client::new(),
        }
    }
}

fn derive_ws_url(base_url: &str) -> String {
    let stream = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    format!("{stream}/registry/events/created")
}

fn transport(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> LedgerResult<T> {
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(LedgerError::NotFound);
    }
    if !resp.status().is_success() {
        return Err(LedgerError::Transport(format!(
            "registry returned {}",
            resp.status()
        )));
    }
    resp.json::<T>().await.map_err(transport)
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_history(&self, id: ProductId) -> LedgerResult<LedgerProduct> {
        let url = format!("{}/registry/products/{id}", self.base_url);
        let resp = self.http.get(&url).send().await.map_err(transport)?;
        let wire: WireProduct = decode(resp).await?;
        wire.into_record().map_err(LedgerError::Transport)
    }

    async fn get_owned_ids(&self, owner: &OwnerAddress) -> LedgerResult<Vec<ProductId>> {
        let url = format!("{}/registry/owners/{owner}/products", self.base_url);
        let resp = self.http.get(&url).send().await.map_err(transport)?;
        let ids: Vec<u64> = decode(resp).await?;
        Ok(ids.into_iter().map(ProductId).collect())
    }

    async fn create_product(
        &self,
        name: &str,
        quantity: u64,
        harvest_date_epoch: i64,
    ) -> LedgerResult<ProductId> {
        let url = format!("{}/registry/products", self.base_url);
        let body = serde_json::json!({
            "name": name,
            "quantity": quantity,
            "harvest_date": harvest_date_epoch,
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let created: WireCreateResponse = decode(resp).await?;
        Ok(ProductId(created.id))
    }

    async fn append_update(
        &self,
        id: ProductId,
        status: &str,
        payload: &str,
    ) -> LedgerResult<TransactionRef> {
        let url = format!("{}/registry/products/{id}/updates", self.base_url);
        let body = serde_json::json!({ "status": status, "payload": payload });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let update: WireUpdateResponse = decode(resp).await?;
        Ok(update.transaction_ref)
    }

    async fn subscribe_created(&self) -> LedgerResult<CreatedEvents> {
        let (tx, rx) = mpsc::channel(64);
        let ws_url = self.ws_url.clone();
        tokio::spawn(run_created_subscription(ws_url, tx));
        Ok(CreatedEvents::new(rx))
    }
}

/// Long-lived WebSocket reader feeding the subscription channel.
///
/// Reconnects with exponential backoff (1s doubling to a 30s cap, reset on a
/// successful connect). Ends when the receiving side of the channel is gone.
async fn run_created_subscription(ws_url: String, tx: mpsc::Sender<ProductCreated>) {
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    loop {
        match tokio_tungstenite::connect_async(ws_url.as_str()).await {
            Ok((mut ws, _)) => {
                info!("ledger events: connected to {ws_url}");
                backoff = Duration::from_secs(1);

                while let Some(msg) = ws.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            let wire = match serde_json::from_str::<WireCreated>(&text) {
                                Ok(wire) => wire,
                                Err(e) => {
                                    warn!("ledger events: undecodable notification: {e}");
                                    continue;
                                }
                            };
                            match wire.into_event() {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("ledger events: rejected notification: {e}"),
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("ledger events: stream error: {e}");
                            break;
                        }
                    }
                }
                warn!("ledger events: stream ended, reconnecting");
            }
            Err(e) => {
                warn!("ledger events: connect failed: {e} (retrying in {backoff:?})");
            }
        }

        tokio::select! {
            _ = tx.closed() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}
