//! Memory Store Module
//!
//! HashMap storage with LRU tracking and lazy TTL expiry. This is the
//! substrate behind the `memory` driver; it knows nothing about prefixes or
//! groups and works on fully built storage keys.

use std::collections::HashMap;

use serde_json::Value;

use crate::cache::entry::current_timestamp;
use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Memory Store ==
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: CacheStats,
    /// Maximum number of entries allowed, 0 = unbounded
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
        }
    }

    // == Set ==
    /// Stores an entry, overwriting any previous one.
    ///
    /// If the store is at capacity the least recently used entry is evicted.
    pub fn set(&mut self, key: String, entry: CacheEntry) {
        let is_overwrite = self.entries.contains_key(&key);

        if !is_overwrite && self.max_entries > 0 && self.entries.len() >= self.max_entries {
            if let Some(evicted_key) = self.lru.evict_oldest() {
                self.entries.remove(&evicted_key);
                self.stats.record_eviction();
            }
        }

        self.lru.touch(&key);
        self.entries.insert(key, entry);
    }

    // == Get ==
    /// Returns the live value for `key`.
    ///
    /// An expired entry is removed on the spot and counted as a miss.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        match self.live_entry(key) {
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Mutable access to a live entry without touching hit/miss counters.
    pub fn entry_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.live_entry(key).is_none() {
            return None;
        }
        self.lru.touch(key);
        self.entries.get_mut(key)
    }

    /// True when `key` holds a live entry; lazily evicts an expired one.
    pub fn contains(&mut self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    fn live_entry(&mut self, key: &str) -> Option<&CacheEntry> {
        let expired = self.entries.get(key)?.is_expired();
        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
            self.stats.record_expirations(1);
            return None;
        }
        self.entries.get(key)
    }

    // == Delete ==
    /// Removes an entry; returns whether a live one existed.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.lru.remove(key);
                !entry.is_expired()
            }
            None => false,
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) -> usize {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        for key in &doomed {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        doomed.len()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries; returns the number removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.stats.record_expirations(expired_keys.len());
        expired_keys.len()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    fn entry(value: Value) -> CacheEntry {
        CacheEntry::new(value, 300)
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::new(100);

        store.set("key1".to_string(), entry(json!("value1")));

        assert_eq!(store.get("key1"), Some(json!("value1")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = MemoryStore::new(100);
        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = MemoryStore::new(100);

        store.set("key1".to_string(), entry(json!(1)));
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = MemoryStore::new(100);

        store.set("key1".to_string(), entry(json!("value1")));
        store.set("key1".to_string(), entry(json!("value2")));

        assert_eq!(store.get("key1"), Some(json!("value2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_lazy_expiry_on_read() {
        let mut store = MemoryStore::new(100);

        store.set("key1".to_string(), CacheEntry::new(json!("v"), 1));
        assert!(store.get("key1").is_some());

        sleep(Duration::from_millis(2100));

        assert_eq!(store.get("key1"), None);
        assert_eq!(store.len(), 0, "expired entry is evicted by the read");
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = MemoryStore::new(3);

        store.set("key1".to_string(), entry(json!(1)));
        store.set("key2".to_string(), entry(json!(2)));
        store.set("key3".to_string(), entry(json!(3)));
        store.get("key1");
        store.set("key4".to_string(), entry(json!(4)));

        assert_eq!(store.len(), 3);
        assert!(store.get("key1").is_some());
        assert!(store.get("key2").is_none());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_unbounded() {
        let mut store = MemoryStore::new(0);
        for i in 0..50 {
            store.set(format!("k{i}"), entry(json!(i)));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_remove_prefixed() {
        let mut store = MemoryStore::new(100);
        store.set("a_1".to_string(), entry(json!(1)));
        store.set("a_2".to_string(), entry(json!(2)));
        store.set("b_1".to_string(), entry(json!(3)));

        assert_eq!(store.remove_prefixed("a_"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("b_1"));
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = MemoryStore::new(100);

        store.set("key1".to_string(), CacheEntry::new(json!(1), 1));
        store.set("key2".to_string(), CacheEntry::new(json!(2), 10));

        sleep(Duration::from_millis(2100));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }

    #[test]
    fn test_entry_mut_updates_in_place() {
        let mut store = MemoryStore::new(100);
        store.set("n".to_string(), entry(json!(5)));

        if let Some(e) = store.entry_mut("n") {
            e.value = json!(6);
        }
        assert_eq!(store.get("n"), Some(json!(6)));
        assert!(store.entry_mut("missing").is_none());
    }
}
