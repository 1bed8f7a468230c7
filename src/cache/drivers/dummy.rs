//! No-op driver.
//!
//! Writes report success, reads miss, nothing ever fails. Used while caching
//! is disabled and as the last resort when no configured driver is usable.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::base::{GroupToken, HandlerBase};
use crate::cache::handler::{Capabilities, CacheHandler};
use crate::config::CacheConfig;
use crate::error::Result;

pub struct DummyHandler {
    base: HandlerBase,
}

impl DummyHandler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            base: HandlerBase::new("dummy", config),
        }
    }
}

#[async_trait]
impl CacheHandler for DummyHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &Value, _ttl: Option<Duration>) -> Result<bool> {
        Ok(true)
    }

    async fn add(&self, _key: &str, _value: &Value, _ttl: Option<Duration>) -> Result<bool> {
        Ok(true)
    }

    async fn increment(&self, _key: &str, _offset: i64) -> Result<Option<i64>> {
        Ok(None)
    }

    async fn decrement(&self, _key: &str, _offset: i64) -> Result<Option<i64>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Ok(true)
    }

    async fn delete_multiple(&self, _keys: &[String]) -> Result<bool> {
        Ok(true)
    }

    async fn clear(&self) -> Result<bool> {
        Ok(true)
    }

    async fn clear_group(&self, _group: &str) -> Result<bool> {
        Ok(true)
    }

    async fn groups(&self) -> Result<Vec<GroupToken>> {
        Ok(Vec::new())
    }
}
