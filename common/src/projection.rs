use serde::{Deserialize, Serialize};

use crate::product::{HistoryEntry, Product};

/// Which source a projection's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Ledger,
}

/// Read-optimized view of a product and its ordered history.
///
/// Recomputed on every read and discarded after the response; never
/// persisted. The history is always in timeline order (see [`sort_history`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProjection {
    #[serde(flatten)]
    pub product: Product,
    pub history: Vec<HistoryEntry>,
    pub provenance: Provenance,
}

/// Order history entries in place: ascending by timestamp, stable on ties so
/// entries sharing a timestamp keep the order their source emitted them in.
pub fn sort_history(entries: &mut [HistoryEntry]) {
    entries.sort_by_key(|e| e.timestamp);
}

/// The consumer-facing timeline: the projection's history in display order.
/// Absent payloads come through as empty strings rather than failing.
pub fn to_timeline_entries(projection: &ProductProjection) -> Vec<HistoryEntry> {
    let mut entries = projection.history.clone();
    sort_history(&mut entries);
    entries
}
