//! Typed error handling for crudgate
//!
//! Every failure a request can hit is represented here and converted to the
//! HTTP error body `{ "error": ..., "detail": ... }` at the dispatcher
//! boundary.
//!
//! # Error Categories
//!
//! - [`ConfigError`]: fatal startup errors (registration, YAML)
//! - [`ValidationError`]: client input errors (400)
//! - [`NotFoundError`]: unknown endpoint or record (404)
//! - [`Rejection`]: the authorization hook declined the request
//! - [`StorageError`]: storage collaborator failures (500, never leaked)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub use crate::core::auth::Rejection;

/// Generic message returned to clients for server-side failures
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// The main error type for request handling
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal framework errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body sent to HTTP clients
#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected(rejection) => rejection.status,
            ApiError::Config(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Build the client-facing body. Server-side failures never expose
    /// their message.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            ApiError::Validation(e) => ErrorBody {
                error: e.to_string(),
                detail: e.detail(),
            },
            ApiError::NotFound(e) => ErrorBody {
                error: e.to_string(),
                detail: None,
            },
            ApiError::Rejected(r) => ErrorBody {
                error: r.error.clone(),
                detail: r.detail.clone(),
            },
            ApiError::Config(_) | ApiError::Storage(_) | ApiError::Internal(_) => ErrorBody {
                error: INTERNAL_ERROR_MESSAGE.to_string(),
                detail: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(ValidationError::InvalidBody {
            message: err.to_string(),
        })
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors raised while registering endpoints or loading configuration.
/// These abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    #[error("Endpoint '{slug}' is already registered")]
    DuplicateSlug { slug: String },

    #[error("Failed to parse config {source_name}: {message}")]
    ParseError {
        source_name: String,
        message: String,
    },

    #[error("IO error: {message}")]
    IoError { message: String },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A single field validation issue, reported in `detail`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub kind: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Errors caused by client input
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field: {field}")]
    InvalidField { field: String },

    #[error("Invalid command: {command}")]
    InvalidCommand { command: String },

    #[error("Invalid range value for {field}")]
    InvalidRange { field: String, value: String },

    #[error("Invalid in value for {field}")]
    InvalidIn {
        field: String,
        issues: Vec<FieldIssue>,
    },

    #[error("Invalid value for {field}")]
    InvalidValue {
        field: String,
        issues: Vec<FieldIssue>,
    },

    #[error("Invalid value for {key}")]
    InvalidPageParameter { key: String, value: String },

    #[error("Invalid sort field: {field}")]
    InvalidSort { field: String },

    /// Body failed schema validation on create/update
    #[error("Invalid data")]
    InvalidData { issues: Vec<FieldIssue> },

    /// Body missing or not a JSON object
    #[error("Bad Request")]
    InvalidBody { message: String },
}

impl ValidationError {
    /// Structured detail for the error body
    pub fn detail(&self) -> Option<Value> {
        match self {
            ValidationError::InvalidIn { issues, .. }
            | ValidationError::InvalidValue { issues, .. }
            | ValidationError::InvalidData { issues } => Some(json!(issues)),
            ValidationError::InvalidRange { field, value } => Some(json!([FieldIssue::new(
                field.as_str(),
                "range_parsing",
                format!("Expected 'low,high' integers, got '{}'", value),
            )])),
            ValidationError::InvalidPageParameter { key, value } => Some(json!([FieldIssue::new(
                key.as_str(),
                "integer_parsing",
                format!("Expected a non-negative integer, got '{}'", value),
            )])),
            ValidationError::InvalidBody { message } => Some(Value::String(message.clone())),
            ValidationError::InvalidField { .. }
            | ValidationError::InvalidCommand { .. }
            | ValidationError::InvalidSort { .. } => None,
        }
    }
}

// =============================================================================
// Not Found Errors
// =============================================================================

/// Missing endpoint or record. A record hidden by an authorization
/// constraint is reported exactly like a missing one.
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("There is no endpoint named: {slug}")]
    Endpoint { slug: String },

    #[error("No entry found with id {id}")]
    Record { id: String },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to connect to {backend}: {message}")]
    ConnectionError { backend: String, message: String },

    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    #[error("Data integrity error: {message}")]
    IntegrityError { message: String },

    #[error("Storage backend '{backend}' is unavailable")]
    Unavailable { backend: String },
}

/// A specialized Result type for request handling
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_name_the_offender() {
        let err = ValidationError::InvalidField {
            field: "bogus".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid field: bogus");

        let err = ValidationError::InvalidCommand {
            command: "between".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid command: between");
    }

    #[test]
    fn test_status_codes() {
        let err: ApiError = ValidationError::InvalidSort {
            field: "x".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = NotFoundError::Record {
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = Rejection::forbidden("not yours").into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err: ApiError = StorageError::Unavailable {
            backend: "postgres".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_storage_error_body_is_generic() {
        let err: ApiError = StorageError::QueryError {
            backend: "postgres".to_string(),
            message: "relation \"cars\" does not exist".to_string(),
        }
        .into();
        let body = err.to_body();
        assert_eq!(body.error, INTERNAL_ERROR_MESSAGE);
        assert!(body.detail.is_none());
    }

    #[test]
    fn test_invalid_data_carries_issues() {
        let err: ApiError = ValidationError::InvalidData {
            issues: vec![FieldIssue::new("brand", "missing", "Field required")],
        }
        .into();
        let body = serde_json::to_value(err.to_body()).expect("serialize should succeed");
        assert_eq!(body["error"], "Invalid data");
        assert_eq!(body["detail"][0]["field"], "brand");
        assert_eq!(body["detail"][0]["kind"], "missing");
    }

    #[test]
    fn test_error_body_omits_empty_detail() {
        let err: ApiError = NotFoundError::Endpoint {
            slug: "boats".to_string(),
        }
        .into();
        let body = serde_json::to_value(err.to_body()).expect("serialize should succeed");
        assert_eq!(body, json!({ "error": "There is no endpoint named: boats" }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<Value>("{nope").expect_err("invalid json");
        let err: ApiError = json_err.into();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::InvalidBody { .. })
        ));
    }
}
