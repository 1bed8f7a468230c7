//! LRU Tracker Module
//!
//! Least Recently Used bookkeeping for the bounded in-process store.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Every touch stamps the key with a monotonically increasing tick; the
/// smallest tick is the least recently used key.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Last tick per key
    ticks: HashMap<String, u64>,
    /// Keys ordered by tick
    order: BTreeMap<u64, String>,
    clock: u64,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        self.clock += 1;
        if let Some(previous) = self.ticks.insert(key.to_string(), self.clock) {
            self.order.remove(&previous);
        }
        self.order.insert(self.clock, key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    #[cfg(test)]
    fn peek_oldest(&self) -> Option<&String> {
        self.order.values().next()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retouch_moves_key_to_back() {
        let mut lru = LruTracker::new();
        assert!(lru.is_empty());

        lru.touch("blitz_users.1.42");
        lru.touch("blitz_users.1.43");
        lru.touch("blitz_users");
        lru.touch("blitz_users.1.42");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"blitz_users.1.43".to_string()));
    }

    #[test]
    fn test_eviction_follows_access_order() {
        let mut lru = LruTracker::new();
        for key in ["x", "y", "z", "x", "z", "y"] {
            lru.touch(key);
        }

        let drained: Vec<String> = std::iter::from_fn(|| lru.evict_oldest()).collect();
        assert_eq!(drained, ["x", "z", "y"]);
    }

    #[test]
    fn test_remove_forgets_key() {
        let mut lru = LruTracker::new();
        lru.touch("stale");
        lru.touch("live");
        lru.remove("stale");
        lru.remove("never-tracked");

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.evict_oldest().as_deref(), Some("live"));
        assert_eq!(lru.evict_oldest(), None);
    }
}
