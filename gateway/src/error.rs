use thiserror::Error;

/// Failure classes surfaced by the reconciliation service.
///
/// Partial owner resolution is deliberately not an error: it travels as the
/// `skipped` portion of a listing (see [`crate::reconcile::OwnerListing`]).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The id has no resolvable projection in either source. Terminal for
    /// that id; retrying will not help.
    #[error("product not found in cache or on the ledger")]
    NotFound,
    /// Ledger (or cache, with no fallback left) transport failure.
    /// Retryable by the caller; nothing is retried internally.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Malformed id, address or date at the boundary.
    #[error("invalid input: {0}")]
    Validation(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
