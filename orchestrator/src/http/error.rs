//! HTTP error type and its `IntoResponse` mapping. Grounded on
//! `mapleaiorg-maple`'s `palm-daemon::error::ApiError` (status/code/body
//! shape); variants narrowed to what §7 actually names.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid X-API-Key header")]
    Unauthenticated,
    #[error("role lacks required permission")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),
    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),
    #[error(transparent)]
    Delegation(#[from] crate::delegation::DelegationError),
    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(crate::config::ConfigError::UnknownCategory(_)) => StatusCode::NOT_FOUND,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Registry(crate::registry::RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Delegation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(crate::pipeline::PipelineError::DuplicateModule { .. }) => StatusCode::CONFLICT,
            ApiError::Pipeline(crate::pipeline::PipelineError::ModuleNotScaffolded { .. }) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(crate::pipeline::PipelineError::SyntaxError(_)) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
