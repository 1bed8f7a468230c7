//! Driver Registry
//!
//! Maps configured handler names to driver kinds and resolves the
//! configuration into one initialized handler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::drivers::{DummyHandler, FileHandler, MemoryHandler, RedisHandler, SharedHandler};
use crate::cache::handler::CacheHandler;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Builds an uninitialized handler from the configuration.
pub type HandlerFactory = fn(&CacheConfig) -> Box<dyn CacheHandler>;

// == Handler Kind ==
/// Every driver this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Memory,
    Shared,
    File,
    Redis,
    Dummy,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 5] = [
        HandlerKind::Memory,
        HandlerKind::Shared,
        HandlerKind::File,
        HandlerKind::Redis,
        HandlerKind::Dummy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerKind::Memory => "memory",
            HandlerKind::Shared => "shared",
            HandlerKind::File => "file",
            HandlerKind::Redis => "redis",
            HandlerKind::Dummy => "dummy",
        }
    }

    pub fn factory(self) -> HandlerFactory {
        match self {
            HandlerKind::Memory => build_memory,
            HandlerKind::Shared => build_shared,
            HandlerKind::File => build_file,
            HandlerKind::Redis => build_redis,
            HandlerKind::Dummy => build_dummy,
        }
    }

    /// Registry with every driver under its own name.
    pub fn default_registry() -> BTreeMap<String, HandlerKind> {
        Self::ALL
            .into_iter()
            .map(|kind| (kind.as_str().to_string(), kind))
            .collect()
    }
}

fn build_memory(config: &CacheConfig) -> Box<dyn CacheHandler> {
    Box::new(MemoryHandler::new(config))
}

fn build_shared(config: &CacheConfig) -> Box<dyn CacheHandler> {
    Box::new(SharedHandler::new(config))
}

fn build_file(config: &CacheConfig) -> Box<dyn CacheHandler> {
    Box::new(FileHandler::new(config))
}

fn build_redis(config: &CacheConfig) -> Box<dyn CacheHandler> {
    Box::new(RedisHandler::new(config))
}

fn build_dummy(config: &CacheConfig) -> Box<dyn CacheHandler> {
    Box::new(DummyHandler::new(config))
}

// == Resolution ==
fn lookup(config: &CacheConfig, name: &str) -> Result<HandlerKind> {
    config.valid_handlers.get(name).copied().ok_or_else(|| {
        CacheError::Config(format!(
            "cache handler '{name}' is not registered in valid_handlers"
        ))
    })
}

/// Resolves `config` into one initialized handler.
///
/// The preferred handler must be registered. When it is unsupported on this
/// host the fallback handler is used if configured (and supported), otherwise
/// the no-op driver. A failing `init` is a configuration error.
pub async fn resolve_handler(config: &CacheConfig) -> Result<Box<dyn CacheHandler>> {
    config.validate()?;

    let preferred = lookup(config, &config.handler)?;
    let mut handler = (preferred.factory())(config);

    if !handler.is_supported() {
        let fallback = match config.fallback_handler.as_deref() {
            Some(name) => {
                let kind = lookup(config, name)?;
                Some((kind.factory())(config)).filter(|candidate| candidate.is_supported())
            }
            None => None,
        };

        handler = fallback.unwrap_or_else(|| build_dummy(config));
        warn!(
            preferred = %config.handler,
            fallback = handler.name(),
            "Cache handler unsupported on this host, falling back"
        );
    }

    handler.init().await.map_err(|e| match e {
        CacheError::Config(_) => e,
        other => CacheError::Config(format!(
            "cache handler '{}' failed to initialize: {other}",
            config.handler
        )),
    })?;

    info!(
        driver = handler.name(),
        prefix = %config.prefix,
        groups = ?config.groups,
        default_ttl = config.duration,
        "Cache handler initialized"
    );
    Ok(handler)
}
