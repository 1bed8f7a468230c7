//! Handler Contract
//!
//! The interface every backend driver satisfies, plus non-atomic default
//! implementations of `add`, the batch operations and `has`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cache::base::{GroupToken, HandlerBase};
use crate::error::Result;

// == Capabilities ==
/// What a driver provides natively instead of through the default fallbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// `add` is a true set-if-not-exists
    pub atomic_add: bool,
    /// `increment`/`decrement` cannot lose updates
    pub atomic_increment: bool,
    /// The substrate expires entries on its own
    pub native_ttl: bool,
    /// `clear` iterates only prefixed keys instead of the whole keyspace
    pub prefix_scan: bool,
    /// Incrementing a missing key starts from zero
    pub implicit_counter_init: bool,
    /// Groups are invalidated by bumping a generation token
    pub generation_tokens: bool,
}

// == Handler Info ==
/// Diagnostic snapshot returned by `info()`.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub driver: String,
    pub capabilities: Capabilities,
    /// Stored entries, when the substrate can count them cheaply
    pub entries: Option<usize>,
    pub details: BTreeMap<String, String>,
}

impl HandlerInfo {
    pub fn new(driver: &str, capabilities: Capabilities) -> Self {
        Self {
            driver: driver.to_string(),
            capabilities,
            entries: None,
            details: BTreeMap::new(),
        }
    }
}

// == Cache Handler ==
/// Uniform contract over one storage substrate.
///
/// All key arguments are caller keys; drivers build storage keys through
/// their [`HandlerBase`]. Substrate failures come back as
/// `CacheError::Backend`; the manager decides how to surface them.
///
/// `add`, `get_multiple`, `set_multiple`, `delete_multiple` and `has` have
/// sequential, non-atomic defaults. Drivers with a native primitive override
/// them and advertise it through [`Capabilities`].
#[async_trait]
pub trait CacheHandler: Send + Sync {
    fn base(&self) -> &HandlerBase;

    fn capabilities(&self) -> Capabilities;

    fn name(&self) -> &'static str {
        self.base().driver()
    }

    /// Whether the substrate can be used on this host.
    fn is_supported(&self) -> bool {
        true
    }

    /// Opens the substrate. An error here is a configuration error.
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value`; `ttl` is resolved through [`HandlerBase::resolve_ttl`].
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool>;

    /// Adds `offset` to an integer value. `None` when the value is missing
    /// (and the driver has no implicit zero) or is not an integer.
    async fn increment(&self, key: &str, offset: i64) -> Result<Option<i64>>;

    async fn decrement(&self, key: &str, offset: i64) -> Result<Option<i64>>;

    /// Removes `key`; returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes everything stored under this handler's prefix.
    async fn clear(&self) -> Result<bool>;

    /// Makes every entry of `group` unreachable.
    async fn clear_group(&self, group: &str) -> Result<bool>;

    /// Current generation of every configured group, in configuration order.
    async fn groups(&self) -> Result<Vec<GroupToken>>;

    async fn info(&self) -> Result<HandlerInfo> {
        Ok(HandlerInfo::new(self.name(), self.capabilities()))
    }

    /// Deletes expired entries for substrates without native expiry.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    // == Provided Defaults ==

    /// Stores only when `key` is absent.
    ///
    /// The default is get-then-set: two racing callers can both succeed.
    async fn add(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl).await
    }

    async fn get_multiple(&self, keys: &[String]) -> Result<Vec<(String, Option<Value>)>> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.get(key).await?;
            found.push((key.clone(), value));
        }
        Ok(found)
    }

    /// Stops at the first failed write and returns `false`.
    async fn set_multiple(&self, items: &[(String, Value)], ttl: Option<Duration>) -> Result<bool> {
        for (key, value) in items {
            if !self.set(key, value, ttl).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Best effort: keeps going past missing keys and substrate failures,
    /// returning `false` if any key was not removed.
    async fn delete_multiple(&self, keys: &[String]) -> Result<bool> {
        let mut all_deleted = true;
        for key in keys {
            match self.delete(key).await {
                Ok(deleted) => all_deleted &= deleted,
                Err(e) if e.is_absorbed() => {
                    warn!(key = %key, driver = self.name(), error = %e, "cache delete failed");
                    all_deleted = false;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(all_deleted)
    }

    /// `get(key).is_some()`. The answer can be stale by the time the caller
    /// acts on it; never branch on it for correctness.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
