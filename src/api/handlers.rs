//! API Handlers
//!
//! HTTP handlers for the cache admin endpoints. Every handler goes through
//! the `CacheManager` facade, so key validation, the enable switch and
//! backend-failure absorption apply exactly as they do for library callers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    ClearResponse, CounterRequest, CounterResponse, DeleteResponse, ErrorResponse, GetResponse,
    HealthResponse, SetRequest, StatsResponse, WriteResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
}

impl AppState {
    pub fn new(cache: CacheManager) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(CacheManager::new(config.cache.clone()))
    }
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message))).into_response()
}

/// PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<WriteResponse>> {
    let stored = state.cache.write(&req.key, &req.value, req.ttl()).await?;
    Ok(Json(WriteResponse::new(req.key, stored)))
}

/// POST /add
///
/// 409 when the key already holds a value.
pub async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Response> {
    let stored = state.cache.add(&req.key, &req.value, req.ttl()).await?;
    let status = if stored {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(WriteResponse::new(req.key, stored))).into_response())
}

/// GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    match state.cache.read::<Value>(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value)).into_response()),
        None => Ok(not_found(format!("Key '{key}' not found"))),
    }
}

/// DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    if state.cache.delete(&key).await? {
        Ok(Json(DeleteResponse::new(key)).into_response())
    } else {
        Ok(not_found(format!("Key '{key}' not found")))
    }
}

/// POST /incr/:key with optional `{"offset": n}`
pub async fn increment_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<CounterRequest>>,
) -> Result<Response> {
    let offset = body.map(|Json(req)| req).unwrap_or_default().offset;
    let value = state.cache.increment(&key, offset).await?;
    Ok(counter_response(key, value))
}

/// POST /decr/:key with optional `{"offset": n}`
pub async fn decrement_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<CounterRequest>>,
) -> Result<Response> {
    let offset = body.map(|Json(req)| req).unwrap_or_default().offset;
    let value = state.cache.decrement(&key, offset).await?;
    Ok(counter_response(key, value))
}

fn counter_response(key: String, value: Option<i64>) -> Response {
    match value {
        Some(value) => Json(CounterResponse { key, value }).into_response(),
        None => not_found(format!("Key '{key}' is missing or not an integer")),
    }
}

/// DELETE /groups/:group
pub async fn clear_group_handler(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<ClearResponse>> {
    let cleared = state.cache.clear_group(&group).await?;
    Ok(Json(ClearResponse {
        target: group,
        cleared,
    }))
}

/// DELETE /flush
pub async fn flush_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let cleared = state.cache.clear().await?;
    Ok(Json(ClearResponse {
        target: state.cache.config().prefix.clone(),
        cleared,
    }))
}

/// GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let info = state.cache.info().await?;
    Ok(Json(StatsResponse::new(info, CacheManager::enabled())))
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::CacheError;
    use serde_json::json;
    use serial_test::serial;

    fn state() -> AppState {
        CacheManager::enable();
        AppState::new(CacheManager::new(CacheConfig::default()))
    }

    fn set_request(key: &str, value: Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_set_and_get_handler() {
        let state = state();

        let Json(resp) = set_handler(State(state.clone()), Json(set_request("k", json!("v"))))
            .await
            .unwrap();
        assert!(resp.stored);

        let response = get_handler(State(state), Path("k".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    #[serial]
    async fn test_get_nonexistent_key() {
        let response = get_handler(State(state()), Path("nonexistent".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[serial]
    async fn test_add_conflict() {
        let state = state();
        let first = add_handler(State(state.clone()), Json(set_request("k", json!(1))))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = add_handler(State(state), Json(set_request("k", json!(2))))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    #[serial]
    async fn test_delete_handler() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("gone", json!(1))))
            .await
            .unwrap();

        let response = delete_handler(State(state.clone()), Path("gone".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = delete_handler(State(state), Path("gone".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[serial]
    async fn test_counter_handlers() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("n", json!(10))))
            .await
            .unwrap();

        let response = increment_handler(
            State(state.clone()),
            Path("n".to_string()),
            Some(Json(CounterRequest { offset: 5 })),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = decrement_handler(State(state.clone()), Path("n".to_string()), None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.cache.read::<i64>("n").await.unwrap(), Some(14));
    }

    #[tokio::test]
    #[serial]
    async fn test_negative_offset_rejected() {
        let result = increment_handler(
            State(state()),
            Path("n".to_string()),
            Some(Json(CounterRequest { offset: -2 })),
        )
        .await;
        assert!(matches!(result, Err(CacheError::Validation(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_set_invalid_key() {
        let result = set_handler(State(state()), Json(set_request("", json!(1)))).await;
        assert!(matches!(result, Err(CacheError::Validation(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_stats_handler() {
        let Json(resp) = stats_handler(State(state())).await.unwrap();
        assert_eq!(resp.driver, "memory");
        assert!(resp.enabled);
        assert_eq!(resp.entries, Some(0));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
