use chrono::{DateTime, Utc};

/// Convert ledger epoch seconds to a UTC datetime.
///
/// The ledger stores every date as integer seconds since the Unix epoch;
/// conversion is lossless at second granularity. Returns `None` for values
/// chrono cannot represent.
pub fn epoch_seconds_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Inverse of [`epoch_seconds_to_datetime`]. Sub-second components do not
/// exist in the ledger representation, so they are truncated here.
pub fn datetime_to_epoch_seconds(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}
