//! Request DTOs for the admin API

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Body of `PUT /set` and `POST /add`.
///
/// `ttl` is in seconds; omitted means the configured duration and `0` means
/// no expiry.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    /// Any JSON value
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }
}

/// Optional body of `POST /incr/:key` and `POST /decr/:key`.
#[derive(Debug, Clone, Deserialize)]
pub struct CounterRequest {
    #[serde(default = "default_offset")]
    pub offset: i64,
}

fn default_offset() -> i64 {
    1
}

impl Default for CounterRequest {
    fn default() -> Self {
        Self {
            offset: default_offset(),
        }
    }
}
