//! Request and Response models for the admin API
//!
//! DTOs for the HTTP bodies exchanged with the cache service.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{CounterRequest, SetRequest};
pub use responses::{
    ClearResponse, CounterResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse,
    StatsResponse, WriteResponse,
};
