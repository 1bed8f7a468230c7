//! Remote key-value driver backed by Redis.
//!
//! Integers travel as bare decimal strings so `INCRBY`/`DECRBY` work on the
//! stored bytes; everything else is JSON. `add` is `SET NX`, `clear` walks the
//! prefix with `SCAN` (never `KEYS`), and `clear_group` is a single `INCR` of
//! the group's generation key.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::base::{decode_value, encode_value, GroupToken, HandlerBase};
use crate::cache::handler::{Capabilities, CacheHandler, HandlerInfo};
use crate::config::{CacheConfig, RedisConfig};
use crate::error::{CacheError, Result};

const DRIVER: &str = "redis";

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));

/// `INFO` fields copied into `info()` details.
const INFO_FIELDS: &[&str] = &[
    "redis_version",
    "uptime_in_seconds",
    "connected_clients",
    "used_memory_human",
    "keyspace_hits",
    "keyspace_misses",
    "evicted_keys",
];

pub struct RedisHandler {
    base: HandlerBase,
    options: RedisConfig,
    connection: Option<ConnectionManager>,
}

impl RedisHandler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            base: HandlerBase::new(DRIVER, config),
            options: config.redis.clone(),
            connection: None,
        }
    }

    fn connection(&self) -> Result<ConnectionManager> {
        self.connection
            .clone()
            .ok_or_else(|| CacheError::backend(DRIVER, "not connected"))
    }

    async fn storage_key(&self, key: &str) -> Result<String> {
        let sanitized = self.base.sanitize_key(key)?;
        let signature = HandlerBase::signature(&self.groups().await?);
        Ok(self.base.compose(&signature, &sanitized))
    }

    async fn step(&self, command: &str, key: &str, offset: i64) -> Result<Option<i64>> {
        let key = self.storage_key(key).await?;
        let mut conn = self.connection()?;
        let reply: redis::RedisResult<i64> = redis::cmd(command)
            .arg(&key)
            .arg(offset)
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_transport_error(&e) => Err(backend(e)),
            Err(e) => {
                debug!(key = %key, error = %e, "stored value is not an integer");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CacheHandler for RedisHandler {
    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            atomic_add: true,
            atomic_increment: true,
            native_ttl: true,
            prefix_scan: true,
            implicit_counter_init: true,
            generation_tokens: true,
        }
    }

    async fn init(&mut self) -> Result<()> {
        let client = Client::open(connection_info(&self.options))
            .map_err(|e| CacheError::Config(format!("invalid redis settings: {e}")))?;

        let timeout = Duration::try_from_secs_f64(self.options.timeout)
            .unwrap_or(Duration::from_secs(2));
        let manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                CacheError::Config(format!("redis connection timed out after {timeout:?}"))
            })?
            .map_err(|e| CacheError::Config(format!("redis connection failed: {e}")))?;

        info!(
            host = %self.options.host,
            port = self.options.port,
            database = self.options.database,
            persistent = self.options.persistent,
            "Redis cache connected"
        );
        self.connection = Some(manager);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = self.storage_key(key).await?;
        let mut conn = self.connection()?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        raw.as_deref().map(decode_payload).transpose()
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let key = self.storage_key(key).await?;
        let ttl = self.base.resolve_ttl(ttl);
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(encode_payload(value)?);
        if ttl > 0 {
            cmd.arg("EX").arg(ttl);
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(backend)?;
        Ok(true)
    }

    async fn add(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<bool> {
        let key = self.storage_key(key).await?;
        let ttl = self.base.resolve_ttl(ttl);
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(encode_payload(value)?).arg("NX");
        if ttl > 0 {
            cmd.arg("EX").arg(ttl);
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn increment(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        self.step("INCRBY", key, offset).await
    }

    async fn decrement(&self, key: &str, offset: i64) -> Result<Option<i64>> {
        self.step("DECRBY", key, offset).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = self.storage_key(key).await?;
        let mut conn = self.connection()?;
        let removed: i64 = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> Result<bool> {
        let mut conn = self.connection()?;
        let pattern = format!("{}*", escape_glob(self.base.prefix()));
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(backend)?;
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(removed, pattern = %pattern, "redis cache cleared");
        Ok(true)
    }

    async fn clear_group(&self, group: &str) -> Result<bool> {
        let group = self.base.sanitize_group(group)?;
        if !self.base.is_group(&group) {
            debug!(group = %group, "not a configured group, nothing to clear");
            return Ok(false);
        }
        let mut conn = self.connection()?;
        let key = self.base.generation_key(&group);

        // A missing token reads as 1, so the first bump must land on 2.
        let _: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        let generation: i64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        debug!(group = %group, generation, "cache group invalidated");
        Ok(true)
    }

    async fn groups(&self) -> Result<Vec<GroupToken>> {
        let names = self.base.groups();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection()?;
        let keys = self.base.generation_keys();
        let mut current: Vec<Option<i64>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        for (idx, key) in keys.iter().enumerate() {
            if current.get(idx).copied().flatten().is_some() {
                continue;
            }
            let _: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(1)
                .arg("NX")
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            let token: Option<i64> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            if let Some(slot) = current.get_mut(idx) {
                *slot = token;
            }
        }

        Ok(names
            .iter()
            .zip(current)
            .map(|(name, token)| GroupToken::new(name.clone(), token.unwrap_or(1).max(0) as u64))
            .collect())
    }

    async fn info(&self) -> Result<HandlerInfo> {
        let mut conn = self.connection()?;
        let raw: String = redis::cmd("INFO")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        let size: usize = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let mut info = HandlerInfo::new(self.name(), self.capabilities());
        info.entries = Some(size);
        info.details = parse_info(&raw);
        Ok(info)
    }
}

// == Helpers ==

fn connection_info(options: &RedisConfig) -> ConnectionInfo {
    let addr = match &options.unix_socket {
        #[cfg(unix)]
        Some(socket) => ConnectionAddr::Unix(socket.clone()),
        _ => ConnectionAddr::Tcp(options.host.clone(), options.port),
    };

    ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: options.database,
            password: options.password.clone(),
            ..RedisConnectionInfo::default()
        },
    }
}

/// Integers go bare so the server can count on them.
fn encode_payload(value: &Value) -> Result<String> {
    match value.as_i64() {
        Some(n) => Ok(n.to_string()),
        None => encode_value(value),
    }
}

fn decode_payload(raw: &str) -> Result<Value> {
    if INTEGER.is_match(raw) {
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Value::from(n));
        }
    }
    decode_value(raw)
}

/// Escapes glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_info(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.trim().split_once(':'))
        .filter(|(field, _)| INFO_FIELDS.contains(field))
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

fn is_transport_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

fn backend(e: RedisError) -> CacheError {
    CacheError::backend(DRIVER, e)
}
