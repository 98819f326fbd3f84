use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::AppState;

/// Health check endpoint
/// Returns 200 OK if the process is running
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "cost-dashboard",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Readiness check endpoint
/// Ready once the first snapshot has been published
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.cache().current() {
        Some(snapshot) => (StatusCode::OK, Json(json!({
            "status": "ready",
            "generatedAt": snapshot.generated_at,
            "degraded": snapshot.health.is_degraded(),
            "health": snapshot.health,
        }))),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
            "status": "not_ready",
        }))),
    }
}
