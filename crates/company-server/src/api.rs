//! Shared API plumbing: the error type and the health check.

use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use company_store::CompanyError;
use company_types::ValidationErrors;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
///
/// Every variant renders as `{"error": ...}`. Validation failures carry a
/// field map instead of a string.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("edit conflict: {0}")]
    Conflict(String),
    #[error("validation failed")]
    FailedValidation(ValidationErrors),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => {
                tracing::debug!(reason = %msg, "rejected malformed request");
                (
                    StatusCode::BAD_REQUEST,
                    json!("the server could not process your request"),
                )
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!("invalid or missing authentication token"),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!("the requested resource could not be found"),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!(msg)),
            ApiError::FailedValidation(errors) => (StatusCode::UNPROCESSABLE_ENTITY, json!(errors)),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("the server encountered a problem and could not process your request"),
                )
            }
        };

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<CompanyError> for ApiError {
    fn from(e: CompanyError) -> Self {
        match e {
            CompanyError::NotFound(_) => ApiError::NotFound,
            CompanyError::DuplicateName(_) => {
                let mut errors = ValidationErrors::default();
                errors.add("name", "a company with this name already exists");
                ApiError::FailedValidation(errors)
            }
            CompanyError::EditConflict(_) => ApiError::Conflict(
                "unable to update the record due to an edit conflict, please try again"
                    .to_string(),
            ),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Handler for `GET /v1/healthcheck`.
///
/// `lifecycle` turns to `draining` once shutdown has begun.
pub async fn healthcheck_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let lifecycle = *state.lifecycle.borrow();
    Json(json!({
        "status": "available",
        "lifecycle": lifecycle.to_string(),
        "environment": state.env,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
