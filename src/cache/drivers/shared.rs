//! Shared segment driver.
//!
//! Entries live in a process-wide, named segment: every handler configured
//! with the same `shared.segment` sees the same data, the way an opcode or
//! shared-memory cache is visible to every worker on one host. Counters and
//! `add` run under the segment's shard locks and are atomic.
//!
//! There is no native prefix iterator; `clear` enumerates the whole segment
//! and filters by prefix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::base::{GroupToken, HandlerBase};
use crate::cache::entry::current_timestamp;
use crate::cache::handler::{Capabilities, CacheHandler, HandlerInfo};
use crate::cache::CacheEntry;
use crate::config::CacheConfig;
use crate::error::Result;

type Segment = DashMap<String, CacheEntry>;

static SEGMENTS: Lazy<DashMap<String, Arc<Segment>>> = Lazy::new(DashMap::new);

fn attach(name: &str) -> Arc<Segment> {
    SEGMENTS
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(DashMap::new()))
        .clone()
}

pub struct SharedHandler {
    base: HandlerBase,
    segment_name: String,
    segment: Arc<Segment>,
    max_entries: usize,
}

impl SharedHandler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            base: HandlerBase::new("shared", config),
            segment_name: config.shared.segment.clone(),
            segment: attach(&config.shared.segment),
            max_entries: config.shared.max_entries,
        }
    }

    fn tokens(&self) -> Vec<GroupToken> {
        self.base
            .groups()
            .iter()
            .map(|group| {
                let key = self.base.generation_key(group);
                let generation = self
                    .segment
                    .entry(key)
                    .or_insert_with(|| CacheEntry::persistent(json!(1)))
                    .as_counter()
                    .unwrap_or(1);
                GroupToken::new(group.clone(), generation.max(0) as u64)
            })
            .collect()
    }

    fn storage_key(&self, key: &str) -> Result<String> {
        let sanitized = self.base.sanitize_key(key)?;
        let signature = HandlerBase::signature(&self.tokens());
        Ok(self.base.compose(&signature, &sanitized))
    }

    /// Frees one slot when the segment is full: expired entries go first,
    /// then the entry closest to expiry. A segment holding only persistent
    /// entries gives up one of this handler's own data entries. Generation
    /// tokens are never evicted.
    fn make_room(&self, incoming: &str) {
        if self.max_entries == 0
            || self.segment.len() < self.max_entries
            || self.segment.contains_key(incoming)
        {
            return;
        }

        let now = current_timestamp();
        self.segment.retain(|_, entry| !entry.is_expired_at(now));
        if self.segment.len() < self.max_entries {
            return;
        }

        let tokens = self.base.generation_keys();
        let victim = self
            .segment
            .iter()
            .filter(|item| item.expires_at.is_some())
            .min_by_key(|item| item.expires_at)
            .map(|item| item.key().clone())
            .or_else(|| {
                self.segment
                    .iter()
                    .map(|item| item.key().clone())
                    .find(|key| key.starts_with(self.base.prefix()) && !tokens.contains(key))
            });
        if let Some(victim) = victim {
            self.segment.remove(&victim);
            debug!(key = %victim, segment = %self.segment_name, "shared cache entry evicted");
        }
    }

    fn step(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let key = self.storage_key(key)?;
        let Some(mut entry) = self.segment.get_mut(&key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.segment.remove_if(&key, |_, e| e.is_expired());
            return Ok(None);
        }
        let Some(next) = entry.as_counter().and_then(|n| n.checked_add(delta)) else {
            return Ok(None);
        };
        entry.value = json!(next);
        Ok(Some(next))
    }
}

#[async_trait]
impl CacheHandler for SharedHandler {
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
        let key = self.storage_key(key)?;
        let Some(entry) = self.segment.get(&key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.segment.remove_if(&key, |_, e| e.is_expired());
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let key = self.storage_key(key)?;
        let ttl = self.base.resolve_ttl(ttl);
        self.make_room(&key);
        self.segment.insert(key, CacheEntry::new(value.clone(), ttl));
        Ok(true)
    }

    async fn add(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let key = self.storage_key(key)?;
        let ttl = self.base.resolve_ttl(ttl);
        self.make_room(&key);

        let added = match self.segment.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(CacheEntry::new(value.clone(), ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value.clone(), ttl));
                true
            }
        };
        Ok(added)
    }

    async fn increment(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        self.step(key, offset)
    }

    async fn decrement(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        self.step(key, offset.saturating_neg())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = self.storage_key(key)?;
        Ok(self
            .segment
            .remove(&key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn clear(&self) -> Result<bool> {
        let prefix = self.base.prefix();
        self.segment.retain(|key, _| !key.starts_with(prefix));
        Ok(true)
    }

    async fn clear_group(&self, group: &str) -> Result<bool> {
        let group = self.base.sanitize_group(group)?;
        if !self.base.is_group(&group) {
            debug!(group = %group, "not a configured group, nothing to clear");
            return Ok(false);
        }
        let mut token = self
            .segment
            .entry(self.base.generation_key(&group))
            .or_insert_with(|| CacheEntry::persistent(json!(1)));
        let next = token.as_counter().unwrap_or(1) + 1;
        token.value = json!(next);
        debug!(group = %group, generation = next, "cache group invalidated");
        Ok(true)
    }

    async fn groups(&self) -> Result<Vec<GroupToken>> {
        Ok(self.tokens())
    }

    async fn info(&self) -> Result<HandlerInfo> {
        let mut info = HandlerInfo::new(self.name(), self.capabilities());
        info.entries = Some(self.segment.len());
        info.details
            .insert("segment".to_string(), self.segment_name.clone());
        info.details
            .insert("max_entries".to_string(), self.max_entries.to_string());
        Ok(info)
    }
}
