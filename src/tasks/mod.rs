//! Background Tasks Module
//!
//! Reads expire lazily. The sweep job only reclaims space on drivers whose
//! substrate has no expiry of its own.

mod sweep;

pub use sweep::spawn_sweep_task;
