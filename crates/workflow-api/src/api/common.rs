//! Shared DTOs and error mapping for the public API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use workflow_model::TopoError;
use workflow_storage::StoreError;
use workflow_validation::ValidationError;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Response wrapper for list endpoints: all list endpoints return their
/// items wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// One error type for every handler in this crate. Each variant carries
/// its own status code so handlers can `?`-propagate freely instead of
/// hand-mapping at every call site.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("stored definition no longer validates: {0}")]
    StoredDefinitionInvalid(#[from] TopoError),

    #[error("invalid workflow definition: {0}")]
    MalformedDefinition(serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_)
            | ApiError::MalformedDefinition(_)
            | ApiError::StoredDefinitionInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::WorkflowNotFound(_))
            | ApiError::Store(StoreError::RunNotFound(_))
            | ApiError::Store(StoreError::StepNotFound(_))
            | ApiError::Store(StoreError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::DuplicateIdempotencyKey(_)) => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error serving request");
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
