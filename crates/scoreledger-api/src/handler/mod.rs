//! HTTP handlers for Scoreledger
//!
//! - `routes`: router construction and endpoint handlers
//!
//! This module holds the wire types shared by the routes and the
//! [`ApiError`] mapping from service failures to HTTP responses.

pub mod routes;

pub use routes::{create_router, get_prediction, health_check, predict, update, AppState};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scoreledger_core::{ServiceError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful score response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub prediction: bool,
    pub probability: f64,
    /// Set when the score could not be persisted because the id already exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Echo of the request's `observation_id` for request-shape errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<Value>,
    /// Offending field name, or a message
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Offending value, rendered as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            observation_id: None,
            error: message.into(),
            reason: None,
            value: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub model: String,
    pub schema_columns: usize,
    /// `None` when the ledger could not be queried
    pub ledger_records: Option<u64>,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub version: String,
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Body is unreadable or not parseable JSON
    BadRequest(String),
    /// Request failed a validation rule
    Invalid(ValidationError),
    /// Field could not be coerced to its schema type
    Unprocessable {
        observation_id: i64,
        field: String,
        value: String,
    },
    NotFound(String),
    InternalError(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Invalid(_) => "VALIDATION_FAILED",
            ApiError::Unprocessable { .. } => "COERCION_FAILED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Invalid(_) | ApiError::Unprocessable { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Invalid(err) => ErrorBody {
                observation_id: Some(err.observation_id.clone()),
                error: err.field.clone(),
                reason: Some(err.reason.code().to_string()),
                value: err.reason.literal().map(str::to_string),
            },
            ApiError::Unprocessable {
                observation_id,
                field,
                value,
            } => ErrorBody {
                observation_id: Some(Value::from(*observation_id)),
                error: field.clone(),
                reason: Some("wrong_type".to_string()),
                value: Some(value.clone()),
            },
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::InternalError(msg) => {
                ErrorBody::message(msg.clone())
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(err) => ApiError::Invalid(err),
            ServiceError::Coercion {
                observation_id,
                source,
            } => ApiError::Unprocessable {
                observation_id,
                field: source.field,
                value: source.actual,
            },
            err @ ServiceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            err @ ServiceError::MalformedBody(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "Request failed: {:?}", self);
        } else {
            tracing::debug!(code = self.error_code(), "Request rejected");
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreledger_core::Reason;
    use serde_json::json;

    #[test]
    fn test_score_response_omits_note_when_recorded() {
        let response = ScoreResponse {
            prediction: true,
            probability: 0.8,
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"prediction": true, "probability": 0.8})
        );
    }

    #[test]
    fn test_validation_error_body() {
        let error = ApiError::Invalid(ValidationError::new(
            json!(4),
            "sex",
            Reason::OutOfRange("3".into()),
        ));
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.error_code(), "VALIDATION_FAILED");
        assert_eq!(
            serde_json::to_value(error.body()).unwrap(),
            json!({"observation_id": 4, "error": "sex", "reason": "out_of_range", "value": "3"})
        );
    }

    #[test]
    fn test_missing_id_is_echoed_as_null() {
        let error = ApiError::Invalid(ValidationError::new(
            Value::Null,
            "observation_id",
            Reason::Missing,
        ));
        assert_eq!(
            serde_json::to_value(error.body()).unwrap(),
            json!({"observation_id": null, "error": "observation_id", "reason": "missing"})
        );
    }

    #[test]
    fn test_service_error_mapping() {
        let error: ApiError = ServiceError::NotFound { observation_id: 999 }.into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            error.body().error,
            "Observation ID: \"999\" does not exist"
        );

        let source = serde_json::from_str::<Value>("{\"observation_id\": ").unwrap_err();
        let error: ApiError = ServiceError::MalformedBody(source).into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.body().error.starts_with("Malformed request body"));
    }
}
