//! Backend drivers, one per storage substrate.

mod dummy;
mod file;
mod memory;
mod redis;
mod shared;

pub use self::dummy::DummyHandler;
pub use self::file::FileHandler;
pub use self::memory::MemoryHandler;
pub use self::redis::RedisHandler;
pub use self::shared::SharedHandler;
