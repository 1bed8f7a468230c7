//! Configuration Module
//!
//! Handles loading and managing service and cache engine configuration, either
//! from environment variables or from any serde source.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::cache::{validate_key, HandlerKind};
use crate::error::{CacheError, Result};

/// Default key prefix shared by every handler.
pub const DEFAULT_PREFIX: &str = "blitz_";

/// Default TTL in seconds.
pub const DEFAULT_DURATION: u64 = 3600;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Expired-entry sweep interval in seconds, 0 disables the sweep job
    pub sweep_interval: u64,
    /// Cache engine settings
    pub cache: CacheConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 0, disabled)
    /// - `CACHE_*`, `REDIS_*` - see [`CacheConfig::from_env`]
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("SERVER_PORT").unwrap_or(3000),
            sweep_interval: env_parse("SWEEP_INTERVAL").unwrap_or(0),
            cache: CacheConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            sweep_interval: 0,
            cache: CacheConfig::default(),
        }
    }
}

// == Cache Config ==
/// Options consumed once, when the cache handler is constructed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Registered driver name to use
    pub handler: String,
    /// Driver used when `handler` is unsupported on this host
    #[serde(alias = "fallback_handler")]
    pub fallback_handler: Option<String>,
    /// Registry of installable drivers
    #[serde(alias = "valid_handlers")]
    pub valid_handlers: BTreeMap<String, HandlerKind>,
    /// Default TTL in seconds; accepts integers or strings such as "10m"
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: u64,
    /// Group names whose generation tokens are woven into every key
    pub groups: Vec<String>,
    /// Namespace isolation prefix
    pub prefix: String,
    /// Emit a warning when a write fails
    #[serde(alias = "warn_on_write_failures")]
    pub warn_on_write_failures: bool,
    pub memory: MemoryConfig,
    pub shared: SharedConfig,
    pub file: FileConfig,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            handler: "memory".to_string(),
            fallback_handler: None,
            valid_handlers: HandlerKind::default_registry(),
            duration: DEFAULT_DURATION,
            groups: Vec::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            warn_on_write_failures: true,
            memory: MemoryConfig::default(),
            shared: SharedConfig::default(),
            file: FileConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Loads the engine configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_HANDLER` (default: memory), `CACHE_FALLBACK_HANDLER`
    /// - `CACHE_DURATION` - seconds or a humantime string (default: 3600)
    /// - `CACHE_GROUPS` - comma separated group names
    /// - `CACHE_PREFIX` (default: blitz_), `CACHE_WARN_ON_WRITE_FAILURES`
    /// - `CACHE_MEMORY_MAX_ENTRIES`, `CACHE_SHARED_SEGMENT`, `CACHE_SHARED_MAX_ENTRIES`
    /// - `CACHE_PATH`, `CACHE_FILE_MASK` (octal), `CACHE_FILE_LOCK`, `CACHE_FILE_SERIALIZE`
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DATABASE`,
    ///   `REDIS_TIMEOUT`, `REDIS_PERSISTENT`, `REDIS_UNIX_SOCKET`
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let groups = env::var("CACHE_GROUPS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            handler: env::var("CACHE_HANDLER").unwrap_or(defaults.handler),
            fallback_handler: env::var("CACHE_FALLBACK_HANDLER")
                .ok()
                .filter(|v| !v.is_empty()),
            duration: env::var("CACHE_DURATION")
                .ok()
                .and_then(|v| parse_duration(&v).ok())
                .unwrap_or(defaults.duration),
            groups,
            prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.prefix),
            warn_on_write_failures: env_parse("CACHE_WARN_ON_WRITE_FAILURES")
                .unwrap_or(defaults.warn_on_write_failures),
            memory: MemoryConfig {
                max_entries: env_parse("CACHE_MEMORY_MAX_ENTRIES")
                    .unwrap_or(defaults.memory.max_entries),
            },
            shared: SharedConfig {
                segment: env::var("CACHE_SHARED_SEGMENT").unwrap_or(defaults.shared.segment),
                max_entries: env_parse("CACHE_SHARED_MAX_ENTRIES")
                    .unwrap_or(defaults.shared.max_entries),
            },
            file: FileConfig {
                path: env::var("CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.file.path),
                mask: env::var("CACHE_FILE_MASK")
                    .ok()
                    .and_then(|v| u32::from_str_radix(v.trim_start_matches("0o"), 8).ok())
                    .unwrap_or(defaults.file.mask),
                lock: env_parse("CACHE_FILE_LOCK").unwrap_or(defaults.file.lock),
                serialize: env_parse("CACHE_FILE_SERIALIZE").unwrap_or(defaults.file.serialize),
            },
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or(defaults.redis.host),
                port: env_parse("REDIS_PORT").unwrap_or(defaults.redis.port),
                password: env::var("REDIS_PASSWORD").ok().filter(|v| !v.is_empty()),
                database: env_parse("REDIS_DATABASE").unwrap_or(defaults.redis.database),
                timeout: env_parse("REDIS_TIMEOUT").unwrap_or(defaults.redis.timeout),
                persistent: env_parse("REDIS_PERSISTENT").unwrap_or(defaults.redis.persistent),
                unix_socket: env::var("REDIS_UNIX_SOCKET")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from),
            },
            valid_handlers: defaults.valid_handlers,
        }
    }

    /// Checks the options the engine cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.handler.trim().is_empty() {
            return Err(CacheError::Config("no cache handler configured".into()));
        }
        if self.prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CacheError::Config(format!(
                "cache prefix '{}' contains whitespace or control characters",
                self.prefix
            )));
        }
        for (idx, group) in self.groups.iter().enumerate() {
            let normalized = validate_key(group, "")
                .map_err(|e| CacheError::Config(format!("invalid cache group: {e}")))?;
            if &normalized != group {
                return Err(CacheError::Config(format!(
                    "cache group '{group}' must not contain whitespace"
                )));
            }
            if self.groups[..idx].contains(group) {
                return Err(CacheError::Config(format!(
                    "cache group '{group}' is listed twice"
                )));
            }
        }
        Ok(())
    }
}

// == Driver Sections ==
/// In-process map driver options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Entries kept before the least recently used one is evicted
    pub max_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

/// Process-wide shared segment driver options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Segment name; handlers naming the same segment share one store
    pub segment: String,
    /// Entries kept before eviction kicks in
    pub max_entries: usize,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            segment: "default".to_string(),
            max_entries: 65_536,
        }
    }
}

/// Filesystem driver options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Cache directory root
    pub path: PathBuf,
    /// Unix permission bits applied to every cache file
    pub mask: u32,
    /// Take advisory locks around reads and writes
    pub lock: bool,
    /// Store values as JSON; when false only strings are accepted, written verbatim
    pub serialize: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: env::temp_dir().join("blitz-cache"),
            mask: 0o640,
            lock: true,
            serialize: true,
        }
    }
}

/// Remote key-value store options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    #[serde(alias = "server")]
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
    /// Connect timeout in seconds
    pub timeout: f64,
    pub persistent: bool,
    pub unix_socket: Option<PathBuf>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            timeout: 2.0,
            persistent: false,
            unix_socket: None,
        }
    }
}

// == Helpers ==
/// Parses a TTL given either as bare seconds or a humantime string ("90s", "2h").
pub fn parse_duration(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(seconds);
    }
    let parsed = humantime::parse_duration(raw)
        .map_err(|e| CacheError::Config(format!("invalid duration '{raw}': {e}")))?;
    Ok(whole_seconds(parsed))
}

/// Rounds a duration up to whole seconds.
pub fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(seconds) => Ok(seconds),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.sweep_interval, 0);
        assert_eq!(config.cache.handler, "memory");
        assert_eq!(config.cache.prefix, "blitz_");
        assert_eq!(config.cache.duration, 3600);
        assert!(config.cache.warn_on_write_failures);
        assert!(config.cache.groups.is_empty());
        assert!(config.cache.fallback_handler.is_none());
    }

    #[test]
    fn test_default_registry_names_every_driver() {
        let config = CacheConfig::default();
        for name in ["memory", "shared", "file", "redis", "dummy"] {
            assert!(config.valid_handlers.contains_key(name), "missing {name}");
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        env::remove_var("SERVER_PORT");
        env::remove_var("SWEEP_INTERVAL");
        env::remove_var("CACHE_HANDLER");
        env::remove_var("CACHE_GROUPS");
        env::remove_var("CACHE_DURATION");

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.sweep_interval, 0);
        assert_eq!(config.cache.handler, "memory");
        assert_eq!(config.cache.duration, 3600);
    }

    #[test]
    #[serial]
    fn test_cache_config_from_env() {
        env::set_var("CACHE_HANDLER", "file");
        env::set_var("CACHE_GROUPS", "users, posts,,");
        env::set_var("CACHE_DURATION", "10m");
        env::set_var("CACHE_FILE_MASK", "0o600");

        let config = CacheConfig::from_env();
        assert_eq!(config.handler, "file");
        assert_eq!(config.groups, vec!["users", "posts"]);
        assert_eq!(config.duration, 600);
        assert_eq!(config.file.mask, 0o600);

        env::remove_var("CACHE_HANDLER");
        env::remove_var("CACHE_GROUPS");
        env::remove_var("CACHE_DURATION");
        env::remove_var("CACHE_FILE_MASK");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("120").unwrap(), 120);
        assert_eq!(parse_duration("2m").unwrap(), 120);
        assert_eq!(parse_duration("1h 30m").unwrap(), 5400);
        assert_eq!(parse_duration("1500ms").unwrap(), 2);
        assert!(matches!(parse_duration("soon"), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: CacheConfig = serde_json::from_value(serde_json::json!({
            "handler": "redis",
            "fallbackHandler": "memory",
            "duration": "5m",
            "groups": ["users"],
            "prefix": "t_",
            "redis": { "server": "cache.internal", "port": 6380 }
        }))
        .unwrap();

        assert_eq!(config.handler, "redis");
        assert_eq!(config.fallback_handler.as_deref(), Some("memory"));
        assert_eq!(config.duration, 300);
        assert_eq!(config.redis.host, "cache.internal");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.redis.database, 0);
        assert!(config.valid_handlers.contains_key("file"));
    }

    #[test]
    fn test_validate_rejects_bad_groups() {
        let mut config = CacheConfig {
            groups: vec!["users".into(), "users".into()],
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));

        config.groups = vec!["us:ers".into()];
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));

        config.groups = vec!["users".into(), "posts".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_handler() {
        let config = CacheConfig {
            handler: " ".into(),
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }
}
