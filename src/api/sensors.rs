//! Sensor endpoints
//!
//! - POST /sensors - Register a sensor in the identity and geo stores
//! - GET /sensors - Page through registered sensors
//! - GET /sensors/near - Nearby sensors merged with their telemetry
//! - GET /sensors/by-name/:name
//! - GET /sensors/:id
//! - DELETE /sensors/:id - Delete a sensor and its geo document

use crate::api::AppState;
use crate::error::{RegistryError, Result};
use crate::model::{EnrichedSensor, SensorCreate, SensorIdentity};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ListSensorsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// Maximum distance in meters
    pub radius: f64,
}

pub async fn create_sensor(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): WithRejection<Json<SensorCreate>, RegistryError>,
) -> Result<impl IntoResponse> {
    let identity = state.service.create_sensor(request).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

pub async fn list_sensors(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<ListSensorsQuery>, RegistryError>,
) -> Result<Json<Vec<SensorIdentity>>> {
    let sensors = state.service.list_sensors(query.skip, query.limit).await?;
    Ok(Json(sensors))
}

pub async fn get_sensor(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, RegistryError>,
) -> Result<Json<SensorIdentity>> {
    Ok(Json(state.service.get_sensor(id).await?))
}

pub async fn get_sensor_by_name(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(name), _): WithRejection<Path<String>, RegistryError>,
) -> Result<Json<SensorIdentity>> {
    Ok(Json(state.service.get_sensor_by_name(&name).await?))
}

pub async fn delete_sensor(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, RegistryError>,
) -> Result<Json<SensorIdentity>> {
    Ok(Json(state.service.delete_sensor(id).await?))
}

pub async fn sensors_near(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<NearQuery>, RegistryError>,
) -> Result<Json<Vec<EnrichedSensor>>> {
    debug!(
        "Near query at ({}, {}) within {}m",
        query.latitude, query.longitude, query.radius
    );

    let sensors = state
        .service
        .query_sensors_near(query.latitude, query.longitude, query.radius)
        .await?;
    Ok(Json(sensors))
}
