//! In-process memory driver.
//!
//! One `MemoryStore` owned by the handler instance; nothing is shared with
//! other handlers or processes. Every operation takes the store lock once, so
//! counters and `add` are atomic within the process.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::base::{GroupToken, HandlerBase};
use crate::cache::handler::{Capabilities, CacheHandler, HandlerInfo};
use crate::cache::store::MemoryStore;
use crate::cache::CacheEntry;
use crate::config::CacheConfig;
use crate::error::Result;

pub struct MemoryHandler {
    base: HandlerBase,
    store: RwLock<MemoryStore>,
}

impl MemoryHandler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            base: HandlerBase::new("memory", config),
            store: RwLock::new(MemoryStore::new(config.memory.max_entries)),
        }
    }

    /// Reads (creating at 1 when missing) the generation of every group.
    fn tokens(&self, store: &mut MemoryStore) -> Vec<GroupToken> {
        self.base
            .groups()
            .iter()
            .map(|group| {
                let key = self.base.generation_key(group);
                let generation = match store.entry_mut(&key).and_then(|e| e.as_counter()) {
                    Some(current) => current,
                    None => {
                        store.set(key, CacheEntry::persistent(json!(1)));
                        1
                    }
                };
                GroupToken::new(group.clone(), generation.max(0) as u64)
            })
            .collect()
    }

    fn storage_key(&self, store: &mut MemoryStore, sanitized: &str) -> String {
        let signature = HandlerBase::signature(&self.tokens(store));
        self.base.compose(&signature, sanitized)
    }

    async fn step(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let sanitized = self.base.sanitize_key(key)?;
        let mut store = self.store.write().await;
        let key = self.storage_key(&mut store, &sanitized);

        let Some(entry) = store.entry_mut(&key) else {
            return Ok(None);
        };
        let Some(next) = entry.as_counter().and_then(|n| n.checked_add(delta)) else {
            return Ok(None);
        };
        entry.value = json!(next);
        Ok(Some(next))
    }
}

#[async_trait]
impl CacheHandler for MemoryHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            atomic_add: true,
            atomic_increment: true,
            generation_tokens: true,
            ..Capabilities::default()
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let sanitized = self.base.sanitize_key(key)?;
        let mut store = self.store.write().await;
        let key = self.storage_key(&mut store, &sanitized);
        Ok(store.get(&key))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let sanitized = self.base.sanitize_key(key)?;
        let ttl = self.base.resolve_ttl(ttl);
        let mut store = self.store.write().await;
        let key = self.storage_key(&mut store, &sanitized);
        store.set(key, CacheEntry::new(value.clone(), ttl));
        Ok(true)
    }

    async fn add(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let sanitized = self.base.sanitize_key(key)?;
        let ttl = self.base.resolve_ttl(ttl);
        let mut store = self.store.write().await;
        let key = self.storage_key(&mut store, &sanitized);
        if store.contains(&key) {
            return Ok(false);
        }
        store.set(key, CacheEntry::new(value.clone(), ttl));
        Ok(true)
    }

    async fn increment(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        self.step(key, offset).await
    }

    async fn decrement(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        self.step(key, offset.saturating_neg()).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let sanitized = self.base.sanitize_key(key)?;
        let mut store = self.store.write().await;
        let key = self.storage_key(&mut store, &sanitized);
        Ok(store.delete(&key))
    }

    async fn clear(&self) -> Result<bool> {
        let removed = self.store.write().await.remove_prefixed(self.base.prefix());
        debug!(removed, driver = "memory", "cache cleared");
        Ok(true)
    }

    async fn clear_group(&self, group: &str) -> Result<bool> {
        let group = self.base.sanitize_group(group)?;
        if !self.base.is_group(&group) {
            debug!(group = %group, "not a configured group, nothing to clear");
            return Ok(false);
        }
        let key = self.base.generation_key(&group);
        let mut store = self.store.write().await;

        let next = store
            .entry_mut(&key)
            .and_then(|e| e.as_counter())
            .unwrap_or(1)
            + 1;
        store.set(key, CacheEntry::persistent(json!(next)));
        debug!(group = %group, generation = next, "cache group invalidated");
        Ok(true)
    }

    async fn groups(&self) -> Result<Vec<GroupToken>> {
        let mut store = self.store.write().await;
        Ok(self.tokens(&mut store))
    }

    async fn info(&self) -> Result<HandlerInfo> {
        let store = self.store.read().await;
        let mut info = HandlerInfo::new(self.name(), self.capabilities());
        info.entries = Some(store.len());
        info.details = store.stats().details();
        Ok(info)
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.store.write().await.cleanup_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    fn handler(groups: &[&str]) -> MemoryHandler {
        MemoryHandler::new(&CacheConfig {
            prefix: "t_".into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..CacheConfig::default()
        })
    }

    #[tokio::test]
    async fn test_round_trip() {
        let handler = handler(&[]);
        assert!(handler.set("user", &json!({"name": "Ada"}), None).await.unwrap());
        assert_eq!(
            handler.get("user").await.unwrap(),
            Some(json!({"name": "Ada"}))
        );
    }

    #[tokio::test]
    async fn test_invalid_key_never_touches_store() {
        let handler = handler(&[]);
        assert!(matches!(
            handler.set("", &json!(1), None).await,
            Err(CacheError::Validation(_))
        ));
        assert_eq!(handler.info().await.unwrap().entries, Some(0));
    }

    #[tokio::test]
    async fn test_expiry() {
        let handler = handler(&[]);
        handler
            .set("short", &json!("v"), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(handler.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_is_exclusive() {
        let handler = handler(&[]);
        assert!(handler.add("k", &json!("v1"), None).await.unwrap());
        assert!(!handler.add("k", &json!("v2"), None).await.unwrap());
        assert_eq!(handler.get("k").await.unwrap(), Some(json!("v1")));
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let handler = handler(&[]);
        handler.set("n", &json!(10), None).await.unwrap();
        assert_eq!(handler.increment("n", 5).await.unwrap(), Some(15));
        assert_eq!(handler.decrement("n", 20).await.unwrap(), Some(-5));
        assert_eq!(handler.get("n").await.unwrap(), Some(json!(-5)));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integers() {
        let handler = handler(&[]);
        handler.set("s", &json!("not-a-number"), None).await.unwrap();
        assert_eq!(handler.increment("s", 1).await.unwrap(), None);
        assert_eq!(handler.get("s").await.unwrap(), Some(json!("not-a-number")));
        assert_eq!(handler.increment("missing", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_overflow_leaves_value() {
        let handler = handler(&[]);
        handler.set("n", &json!(i64::MAX), None).await.unwrap();
        assert_eq!(handler.increment("n", 1).await.unwrap(), None);
        assert_eq!(handler.get("n").await.unwrap(), Some(json!(i64::MAX)));
    }

    #[tokio::test]
    async fn test_group_generation_starts_at_one_and_bumps() {
        let handler = handler(&["users"]);
        assert_eq!(
            handler.groups().await.unwrap(),
            vec![GroupToken::new("users", 1)]
        );

        handler.set("42", &json!({"name": "Ada"}), None).await.unwrap();
        handler.clear_group("users").await.unwrap();

        assert_eq!(
            handler.groups().await.unwrap(),
            vec![GroupToken::new("users", 2)]
        );
        assert_eq!(handler.get("42").await.unwrap(), None);

        handler.set("42", &json!({"name": "Grace"}), None).await.unwrap();
        assert_eq!(
            handler.get("42").await.unwrap(),
            Some(json!({"name": "Grace"}))
        );
    }

    #[tokio::test]
    async fn test_unknown_group_leaves_data_alone() {
        let handler = handler(&[]);
        handler.set("hits", &json!(41), None).await.unwrap();

        assert!(!handler.clear_group("hits").await.unwrap());
        assert_eq!(handler.get("hits").await.unwrap(), Some(json!(41)));
        assert!(handler.groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_only_touches_own_prefix() {
        let config = CacheConfig::default();
        let handler = MemoryHandler::new(&config);
        handler.set("a", &json!(1), None).await.unwrap();
        {
            let mut store = handler.store.write().await;
            store.set("other_a".to_string(), CacheEntry::persistent(json!(2)));
        }

        handler.clear().await.unwrap();

        assert_eq!(handler.get("a").await.unwrap(), None);
        assert_eq!(handler.info().await.unwrap().entries, Some(1));
    }

    #[tokio::test]
    async fn test_delete_multiple_is_best_effort() {
        let handler = handler(&[]);
        handler.set("existing", &json!(1), None).await.unwrap();

        let keys = vec!["nonexistent".to_string(), "existing".to_string()];
        assert!(!handler.delete_multiple(&keys).await.unwrap());
        assert_eq!(handler.get("existing").await.unwrap(), None);
    }
}
