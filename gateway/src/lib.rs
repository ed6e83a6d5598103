//! FarmChain gateway: a thin caching front for the external product registry.
//!
//! The registry (an append-only ledger) is authoritative but slow; the cache
//! is fast but advisory. [`reconcile::ReconcileService`] assembles product
//! projections from the two, [`listener::EventListener`] mirrors creation
//! notifications into the cache as they happen, and [`http`] exposes the
//! result to the frontend.

pub mod cache;
pub mod error;
pub mod http;
pub mod ledger;
pub mod listener;
pub mod reconcile;
