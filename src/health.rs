use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

/// Liveness probe; no dependencies touched.
pub async fn simple_health_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "up", "service": "academy-api" })),
    )
}

/// Readiness probe; verifies database connectivity.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match crate::db::ping(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "up", "database": "up" })),
        ),
        Err(e) => {
            tracing::error!("readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "down", "database": "down" })),
            )
        }
    }
}
