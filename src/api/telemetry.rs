use crate::api::AppState;
use crate::error::{RegistryError, Result};
use crate::model::{TelemetryReport, TelemetrySnapshot};
use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

/// POST /sensors/:id/telemetry
pub async fn record_telemetry(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(sensor_id), _): WithRejection<Path<i64>, RegistryError>,
    WithRejection(Json(report), _): WithRejection<Json<TelemetryReport>, RegistryError>,
) -> Result<Json<TelemetrySnapshot>> {
    Ok(Json(state.service.record_telemetry(sensor_id, report).await?))
}

/// GET /sensors/:id/telemetry
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(sensor_id), _): WithRejection<Path<i64>, RegistryError>,
) -> Result<Json<TelemetrySnapshot>> {
    Ok(Json(state.service.get_telemetry(sensor_id).await?))
}
