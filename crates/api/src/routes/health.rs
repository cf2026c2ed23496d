use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/ping", get(ping))
}

/// Full health check: database round trip plus watcher status.
async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state
        .database()
        .ping()
        .await
        .map_err(|e| ApiError::Unavailable(format!("database health check failed: {e}")))?;

    Ok(Json(json!({
        "status": "ok",
        "database": "connected",
        "watcher": state.watcher_status(),
    })))
}

/// Lightweight ping, no database check.
async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
