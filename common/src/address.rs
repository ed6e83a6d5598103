use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowercase an address string.
///
/// This is the single point of truth for address equality: two strings refer
/// to the same owner exactly when their normalized forms are byte-equal.
/// Callers must never compare raw address strings directly.
pub fn normalize_address(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// A ledger account address, always held in normalized (lowercase) form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerAddress(String);

impl OwnerAddress {
    /// Validate and normalize an address: a `0x` prefix followed by a
    /// non-empty run of hex digits.
    pub fn parse(s: &str) -> Result<OwnerAddress, String> {
        let normalized = normalize_address(s.trim());
        let payload = normalized
            .strip_prefix("0x")
            .ok_or_else(|| format!("address '{s}' is missing the 0x prefix"))?;
        if payload.is_empty() {
            return Err(format!("address '{s}' has no hex payload"));
        }
        if !payload.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("address '{s}' contains non-hex characters"));
        }
        Ok(OwnerAddress(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for OwnerAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// Stored addresses are re-normalized on the way in, so a record written by an
// older build (or edited by hand) can never smuggle a mixed-case address back
// into memory.
impl<'de> Deserialize<'de> for OwnerAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(OwnerAddress(normalize_address(&raw)))
    }
}
