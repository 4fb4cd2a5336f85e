use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The backing store an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Identity,
    Geo,
    Telemetry,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Identity => "identity",
            StoreKind::Geo => "geo",
            StoreKind::Telemetry => "telemetry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Malformed request: {message}")]
    InvalidRequest { status: StatusCode, message: String },

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("{store} store unavailable: {cause}")]
    StoreUnavailable { store: StoreKind, cause: String },

    #[error("{store} store timed out during {operation}")]
    StoreTimeout { store: StoreKind, operation: String },

    #[error("Dependent step '{step}' failed: {cause} (compensated: {compensated})")]
    DependencyFailure {
        step: String,
        cause: String,
        compensated: bool,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        RegistryError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        RegistryError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub fn unavailable(store: StoreKind, cause: impl ToString) -> Self {
        RegistryError::StoreUnavailable {
            store,
            cause: cause.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::InvalidRequest { status, .. } => *status,
            RegistryError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Conflict { .. } => StatusCode::CONFLICT,
            RegistryError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::StoreTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RegistryError::DependencyFailure { .. } => StatusCode::BAD_GATEWAY,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = match &self {
            RegistryError::InvalidRequest { message, .. } => ErrorResponse {
                error: "invalid_request".to_string(),
                message: message.clone(),
                store: None,
                cause: None,
            },
            RegistryError::Validation { field, message } => ErrorResponse {
                error: "validation_error".to_string(),
                message: format!("Invalid value for '{}': {}", field, message),
                store: None,
                cause: None,
            },
            RegistryError::NotFound { resource, id } => ErrorResponse {
                error: "not_found".to_string(),
                message: format!("{} '{}' not found", resource, id),
                store: None,
                cause: None,
            },
            RegistryError::Conflict { message } => ErrorResponse {
                error: "conflict".to_string(),
                message: message.clone(),
                store: None,
                cause: None,
            },
            RegistryError::StoreUnavailable { store, cause } => ErrorResponse {
                error: "store_unavailable".to_string(),
                message: format!("The {} store is unavailable", store),
                store: Some(*store),
                cause: Some(cause.clone()),
            },
            RegistryError::StoreTimeout { store, operation } => ErrorResponse {
                error: "store_timeout".to_string(),
                message: format!("The {} store did not answer {} in time", store, operation),
                store: Some(*store),
                cause: None,
            },
            RegistryError::DependencyFailure {
                step,
                cause,
                compensated,
            } => ErrorResponse {
                error: "dependency_failure".to_string(),
                message: if *compensated {
                    format!("Step '{}' failed; earlier writes were rolled back", step)
                } else {
                    format!("Step '{}' failed; earlier writes were kept", step)
                },
                store: None,
                cause: Some(cause.clone()),
            },
            RegistryError::Internal(msg) => ErrorResponse {
                error: "internal_error".to_string(),
                message: msg.clone(),
                store: None,
                cause: None,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

// Extractor rejections keep axum's status but use the common error body

impl From<JsonRejection> for RegistryError {
    fn from(rejection: JsonRejection) -> Self {
        RegistryError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for RegistryError {
    fn from(rejection: QueryRejection) -> Self {
        RegistryError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for RegistryError {
    fn from(rejection: PathRejection) -> Self {
        RegistryError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<tokio_postgres::Error> for RegistryError {
    fn from(err: tokio_postgres::Error) -> Self {
        RegistryError::unavailable(StoreKind::Identity, err)
    }
}

impl From<deadpool_postgres::PoolError> for RegistryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        RegistryError::unavailable(StoreKind::Identity, format!("Pool error: {}", err))
    }
}

impl From<mongodb::error::Error> for RegistryError {
    fn from(err: mongodb::error::Error) -> Self {
        RegistryError::unavailable(StoreKind::Geo, err)
    }
}

impl From<redis::RedisError> for RegistryError {
    fn from(err: redis::RedisError) -> Self {
        RegistryError::unavailable(StoreKind::Telemetry, err)
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RegistryError::validation("name", "must not be empty").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            RegistryError::not_found("Sensor", 7).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RegistryError::unavailable(StoreKind::Geo, "refused").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RegistryError::StoreTimeout {
                store: StoreKind::Telemetry,
                operation: "get_snapshot".to_string(),
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RegistryError::DependencyFailure {
                step: "geo insert".to_string(),
                cause: "boom".to_string(),
                compensated: true,
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_invalid_request_keeps_rejection_status() {
        let err = RegistryError::InvalidRequest {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            message: "Expected request with `Content-Type: application/json`".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.into_response().status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_error_names_the_store() {
        let err = RegistryError::unavailable(StoreKind::Telemetry, "connection reset");
        assert_eq!(
            err.to_string(),
            "telemetry store unavailable: connection reset"
        );
    }
}
