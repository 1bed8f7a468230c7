//! Cache Entry Module
//!
//! Defines the in-process representation of a stored value with its expiry.

use serde_json::Value;

// == Cache Entry ==
/// A stored value with its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Expiration timestamp (Unix seconds), None = no expiration
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry living for `ttl_seconds`; 0 never expires.
    pub fn new(value: Value, ttl_seconds: u64) -> Self {
        Self {
            value,
            expires_at: expiry_from_ttl(ttl_seconds),
        }
    }

    /// Creates an entry that never expires.
    pub fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is only live while `expires_at > now`, so it is expired from
    /// the exact second its expiry is reached.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires) if expires <= now)
    }

    /// Integer payload, if the stored value is one.
    pub fn as_counter(&self) -> Option<i64> {
        self.value.as_i64()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Absolute expiry for a TTL in seconds; 0 means no expiry.
pub fn expiry_from_ttl(ttl_seconds: u64) -> Option<i64> {
    if ttl_seconds == 0 {
        return None;
    }
    let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
    Some(current_timestamp().saturating_add(ttl))
}
