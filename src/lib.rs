//! Blitz Cache - a pluggable caching engine
//!
//! One facade over interchangeable drivers (in-process memory, shared
//! segment, filesystem, Redis, no-op) with O(1) group invalidation through
//! generation tokens.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheHandler, CacheManager, HandlerKind};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
