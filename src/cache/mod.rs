//! Cache Module
//!
//! Group-aware caching facade over interchangeable backend drivers.

mod base;
pub mod drivers;
mod entry;
mod handler;
mod lru;
mod manager;
mod registry;
mod stats;
mod store;


// Re-export public types
pub use base::{
    decode_value, encode_value, validate_key, validate_offset, GroupToken, HandlerBase,
    PATH_BREAKING_CHARACTERS, RESERVED_CHARACTERS,
};
pub use entry::{current_timestamp, CacheEntry};
pub use handler::{Capabilities, CacheHandler, HandlerInfo};
pub use lru::LruTracker;
pub use manager::CacheManager;
pub use registry::{resolve_handler, HandlerFactory, HandlerKind};
pub use stats::CacheStats;
pub use store::MemoryStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
