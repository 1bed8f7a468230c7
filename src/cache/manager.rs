//! Cache Manager Module
//!
//! The facade applications call. Resolves the configured driver on first
//! use, validates every caller argument before the substrate is touched and
//! turns substrate failures into `false`/miss results.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::cache::base::{validate_key, validate_offset};
use crate::cache::drivers::DummyHandler;
use crate::cache::handler::{CacheHandler, HandlerInfo};
use crate::cache::registry::resolve_handler;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Process-wide switch. Starts enabled and is never reset implicitly.
static ENABLED: AtomicBool = AtomicBool::new(true);

// == Cache Manager ==
/// Facade over one lazily resolved [`CacheHandler`].
pub struct CacheManager {
    config: CacheConfig,
    handler: OnceCell<Arc<dyn CacheHandler>>,
    dummy: Arc<DummyHandler>,
}

impl CacheManager {
    /// Stores the configuration; the driver is resolved on first use.
    pub fn new(config: CacheConfig) -> Self {
        let dummy = Arc::new(DummyHandler::new(&config));
        Self {
            config,
            handler: OnceCell::new(),
            dummy,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Replaces the configuration and drops the resolved driver.
    ///
    /// Must not race first use of the manager.
    pub fn set_config(&mut self, config: CacheConfig) {
        self.dummy = Arc::new(DummyHandler::new(&config));
        self.config = config;
        self.handler = OnceCell::new();
    }

    // == Enable Switch ==
    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    /// The driver operations run against: the no-op driver while disabled,
    /// otherwise the configured one (resolved once).
    pub async fn handler(&self) -> Result<Arc<dyn CacheHandler>> {
        if !Self::enabled() {
            return Ok(self.dummy.clone());
        }

        let handler = self
            .handler
            .get_or_try_init(|| async {
                let resolved = resolve_handler(&self.config).await?;
                Ok::<_, CacheError>(Arc::from(resolved))
            })
            .await?;
        Ok(handler.clone())
    }

    // == Result Settling ==
    fn settle_write<T>(
        &self,
        result: Result<T>,
        fallback: T,
        key: &str,
        driver: &'static str,
        operation: &'static str,
    ) -> Result<T> {
        match result {
            Err(e) if e.is_absorbed() => {
                if self.config.warn_on_write_failures {
                    warn!(key = %key, driver, operation, error = %e, "Cache write failed");
                }
                Ok(fallback)
            }
            other => other,
        }
    }

    fn settle_read<T>(
        result: Result<T>,
        fallback: T,
        key: &str,
        driver: &'static str,
        operation: &'static str,
    ) -> Result<T> {
        match result {
            Err(e) if e.is_absorbed() => {
                debug!(key = %key, driver, operation, error = %e, "Cache read failed, treating as miss");
                Ok(fallback)
            }
            other => other,
        }
    }

    fn decode<T: DeserializeOwned>(key: &str, value: Option<Value>) -> Option<T> {
        let value = value?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(key = %key, error = %e, "Cached value has a different shape, treating as miss");
                None
            }
        }
    }

    /// Runs a whole batch through the active driver's key rules, so a key
    /// only that driver rejects fails the call before any key is stored.
    fn check_batch<'a>(
        handler: &dyn CacheHandler,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        for key in keys {
            handler.base().sanitize_key(key)?;
        }
        Ok(())
    }

    fn to_value<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|e| {
            CacheError::Validation(format!("Value for key '{key}' is not serializable: {e}"))
        })
    }

    // == Writes ==
    /// Stores `value` under `key`. `false` when the substrate refused it.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        validate_key(key, "")?;
        let value = Self::to_value(key, value)?;
        let handler = self.handler().await?;
        let result = handler.set(key, &value, ttl).await;
        self.settle_write(result, false, key, handler.name(), "set")
    }

    /// Stores every pair, stopping at the first refused write.
    pub async fn write_many<K, T>(&self, items: &[(K, T)], ttl: Option<Duration>) -> Result<bool>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        let mut values = Vec::with_capacity(items.len());
        for (key, value) in items {
            let key = key.as_ref();
            validate_key(key, "")?;
            values.push((key.to_string(), Self::to_value(key, value)?));
        }
        if values.is_empty() {
            return Ok(true);
        }

        let handler = self.handler().await?;
        Self::check_batch(handler.as_ref(), values.iter().map(|(key, _)| key.as_str()))?;
        let result = handler.set_multiple(&values, ttl).await;
        let label = values
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.settle_write(result, false, &label, handler.name(), "set_multiple")
    }

    /// Stores only when `key` is absent.
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        validate_key(key, "")?;
        let value = Self::to_value(key, value)?;
        let handler = self.handler().await?;
        let result = handler.add(key, &value, ttl).await;
        self.settle_write(result, false, key, handler.name(), "add")
    }

    // == Reads ==
    /// Cached value, or `None` on a miss, an expired entry, a substrate
    /// failure or a value that does not decode as `T`.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key, "")?;
        let handler = self.handler().await?;
        let result = handler.get(key).await;
        let value = Self::settle_read(result, None, key, handler.name(), "get")?;
        Ok(Self::decode(key, value))
    }

    pub async fn read_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.read(key).await?.unwrap_or(default))
    }

    /// One entry per requested key; misses map to `None`.
    pub async fn read_many<K, T>(&self, keys: &[K]) -> Result<HashMap<String, Option<T>>>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        let keys = keys
            .iter()
            .map(|key| validate_key(key.as_ref(), "").map(|_| key.as_ref().to_string()))
            .collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let handler = self.handler().await?;
        Self::check_batch(handler.as_ref(), keys.iter().map(String::as_str))?;
        let misses: Vec<(String, Option<Value>)> =
            keys.iter().map(|key| (key.clone(), None)).collect();
        let result = handler.get_multiple(&keys).await;
        let found = Self::settle_read(result, misses, &keys.join(","), handler.name(), "get_multiple")?;

        Ok(found
            .into_iter()
            .map(|(key, value)| {
                let decoded = Self::decode(&key, value);
                (key, decoded)
            })
            .collect())
    }

    /// `read(key)` is some. Stale as soon as it returns; never branch on it
    /// for correctness.
    pub async fn has(&self, key: &str) -> Result<bool> {
        validate_key(key, "")?;
        let handler = self.handler().await?;
        let result = handler.has(key).await;
        Self::settle_read(result, false, key, handler.name(), "has")
    }

    // == Counters ==
    /// New value, or `None` when the value is missing (without implicit
    /// zero), not an integer, or the substrate failed.
    pub async fn increment(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        validate_key(key, "")?;
        validate_offset(offset)?;
        let handler = self.handler().await?;
        let result = handler.increment(key, offset).await;
        self.settle_write(result, None, key, handler.name(), "increment")
    }

    pub async fn decrement(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        validate_key(key, "")?;
        validate_offset(offset)?;
        let handler = self.handler().await?;
        let result = handler.decrement(key, offset).await;
        self.settle_write(result, None, key, handler.name(), "decrement")
    }

    // == Removal ==
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key, "")?;
        let handler = self.handler().await?;
        let result = handler.delete(key).await;
        self.settle_write(result, false, key, handler.name(), "delete")
    }

    /// Best effort: `false` if any key was not removed.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<bool> {
        let keys = keys
            .iter()
            .map(|key| validate_key(key.as_ref(), "").map(|_| key.as_ref().to_string()))
            .collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(true);
        }

        let handler = self.handler().await?;
        Self::check_batch(handler.as_ref(), keys.iter().map(String::as_str))?;
        let result = handler.delete_multiple(&keys).await;
        self.settle_write(result, false, &keys.join(","), handler.name(), "delete_multiple")
    }

    /// Removes everything under the configured prefix.
    pub async fn clear(&self) -> Result<bool> {
        let handler = self.handler().await?;
        let result = handler.clear().await;
        let prefix = self.config.prefix.clone();
        self.settle_write(result, false, &prefix, handler.name(), "clear")
    }

    /// Invalidates every entry written under the current generation of `group`.
    /// `false` when `group` is not a configured group.
    pub async fn clear_group(&self, group: &str) -> Result<bool> {
        validate_key(group, "")?;
        let handler = self.handler().await?;
        let result = handler.clear_group(group).await;
        self.settle_write(result, false, group, handler.name(), "clear_group")
    }

    // == Read-Through ==
    /// Cached value for `key`, or the producer's output after storing it.
    ///
    /// Concurrent misses are not deduplicated: each caller runs its own
    /// producer and the last write wins.
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.read(key).await? {
            return Ok(cached);
        }

        let produced = producer().await;
        if !self.write(key, &produced, ttl).await? {
            debug!(key = %key, "Produced value was not cached");
        }
        Ok(produced)
    }

    // == Diagnostics ==
    /// Driver snapshot. A failing substrate still yields the driver name and
    /// capabilities with the error under `details["error"]`.
    pub async fn info(&self) -> Result<HandlerInfo> {
        let handler = self.handler().await?;
        match handler.info().await {
            Err(e) if e.is_absorbed() => {
                let mut info = HandlerInfo::new(handler.name(), handler.capabilities());
                info.details.insert("error".into(), e.to_string());
                Ok(info)
            }
            other => other,
        }
    }

    /// Removes expired entries on drivers without native expiry.
    pub async fn purge_expired(&self) -> Result<usize> {
        let handler = self.handler().await?;
        let result = handler.purge_expired().await;
        let prefix = self.config.prefix.clone();
        self.settle_write(result, 0, &prefix, handler.name(), "purge_expired")
    }
}
