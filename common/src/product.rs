use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::OwnerAddress;

/// Unique product identifier, assigned by the ledger at creation and never
/// reused. Ledger ids start at 1; zero is not a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u64);

impl ProductId {
    /// Parse a decimal id string. Rejects zero and anything non-numeric.
    pub fn parse(s: &str) -> Option<ProductId> {
        match s.trim().parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(ProductId(n)),
        }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Scalar product fields as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub quantity: u64,
    pub harvest_date: DateTime<Utc>,
    pub owner: OwnerAddress,
}

impl Product {
    /// Check the field invariants the ledger is supposed to uphold. Used
    /// defensively when decoding records from the wire.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("product {} has an empty name", self.id));
        }
        if self.quantity == 0 {
            return Err(format!("product {} has zero quantity", self.id));
        }
        Ok(())
    }
}

/// One lifecycle event in a product's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: String,
    /// Serialized sensor/inspection data. Often empty.
    #[serde(default)]
    pub payload: String,
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction that produced this entry. Absent until confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

/// Display bucket for the known status vocabulary. Statuses are free-form
/// strings on the ledger; anything unrecognized falls into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Created,
    Shipped,
    InTransit,
    Delivered,
    Other,
}

impl StatusKind {
    pub fn classify(status: &str) -> StatusKind {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" => StatusKind::Created,
            "shipped" => StatusKind::Shipped,
            "in transit" => StatusKind::InTransit,
            "delivered" => StatusKind::Delivered,
            _ => StatusKind::Other,
        }
    }
}

/// Lightweight listing row: the scalar product fields plus, when the row came
/// from the cache, the mirror record's creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub quantity: u64,
    pub harvest_date: DateTime<Utc>,
    pub owner: OwnerAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProductSummary {
    pub fn from_product(product: &Product) -> ProductSummary {
        ProductSummary {
            id: product.id,
            name: product.name.clone(),
            quantity: product.quantity,
            harvest_date: product.harvest_date,
            owner: product.owner.clone(),
            created_at: None,
        }
    }
}

/// Durable mirror of a product plus its known history, keyed by product id.
///
/// Never authoritative: the ledger is the sole source of truth, and a record
/// must never carry a history entry the ledger does not. Staleness is
/// expected and tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub product: Product,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Transaction ref of the creation notification this record came from,
    /// when it was mirrored by the event listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            created_at: Some(self.created_at),
            ..ProductSummary::from_product(&self.product)
        }
    }
}
