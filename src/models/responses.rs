//! Response DTOs for the admin API

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{Capabilities, HandlerInfo};

/// Body of `GET /get/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Body of `PUT /set` and `POST /add`.
///
/// `stored` is false when the driver refused the write or, for `add`, when
/// the key already existed.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    pub key: String,
    pub stored: bool,
    pub message: String,
}

impl WriteResponse {
    pub fn new(key: impl Into<String>, stored: bool) -> Self {
        let key = key.into();
        let message = if stored {
            format!("Key '{key}' stored")
        } else {
            format!("Key '{key}' not stored")
        };
        Self {
            key,
            stored,
            message,
        }
    }
}

/// Body of `DELETE /del/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{key}' deleted"),
            key,
        }
    }
}

/// Body of `POST /incr/:key` and `POST /decr/:key`
#[derive(Debug, Clone, Serialize)]
pub struct CounterResponse {
    pub key: String,
    pub value: i64,
}

/// Body of `DELETE /groups/:group` and `DELETE /flush`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub target: String,
    pub cleared: bool,
}

/// Body of `GET /stats`, built from the driver's diagnostic snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub driver: String,
    pub enabled: bool,
    pub entries: Option<usize>,
    pub capabilities: Capabilities,
    pub details: BTreeMap<String, String>,
}

impl StatsResponse {
    pub fn new(info: HandlerInfo, enabled: bool) -> Self {
        Self {
            driver: info.driver,
            enabled,
            entries: info.entries,
            capabilities: info.capabilities,
            details: info.details,
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error body for misses; other errors render through `CacheError`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
