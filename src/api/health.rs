use crate::api::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    postgres_connected: bool,
    mongodb_connected: bool,
    redis_connected: bool,
    uptime_seconds: u64,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.service.check_stores().await;

    let (status_code, status) = if health.all_up() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            postgres_connected: health.identity,
            mongodb_connected: health.geo,
            redis_connected: health.telemetry,
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }),
    )
}
