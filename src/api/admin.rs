use crate::api::AppState;
use crate::error::{RegistryError, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub database: String,
}

/// DELETE /admin/geo/:database - drop a whole geo namespace
pub async fn reset_geo_database(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(database), _): WithRejection<Path<String>, RegistryError>,
) -> Result<impl IntoResponse> {
    state.service.reset_geo_database(&database).await?;

    Ok((
        StatusCode::OK,
        Json(ResetResponse {
            status: "dropped".to_string(),
            database,
        }),
    ))
}
