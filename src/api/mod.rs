//! API Module
//!
//! HTTP admin surface over the cache facade.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value
//! - `POST /add` - Store only if the key is absent
//! - `GET /get/:key` - Read a value
//! - `DELETE /del/:key` - Delete a key
//! - `POST /incr/:key`, `POST /decr/:key` - Step an integer value
//! - `DELETE /groups/:group` - Invalidate a group
//! - `DELETE /flush` - Clear everything under the prefix
//! - `GET /stats` - Driver diagnostics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
