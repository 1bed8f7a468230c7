//! API Routes
//!
//! Configures the Axum router with the cache admin endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_handler, clear_group_handler, decrement_handler, delete_handler, flush_handler,
    get_handler, health_handler, increment_handler, set_handler, stats_handler, AppState,
};

/// Creates the router with every admin endpoint plus CORS and request
/// tracing middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/add", post(add_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/incr/:key", post(increment_handler))
        .route("/decr/:key", post(decrement_handler))
        .route("/groups/:group", delete(clear_group_handler))
        .route("/flush", delete(flush_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
