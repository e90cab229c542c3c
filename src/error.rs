use axum::{
    response::{IntoResponse, Response},
    Json,
    http::StatusCode,
};
use serde::Serialize;

use crate::gemini::GenerationError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Unknown book: {0}")]
    InvalidBook(String),

    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    #[error("Text service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Unusable text service response: {0}")]
    UpstreamMalformed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Forbidden")]
    Forbidden,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::InvalidBook(name) => (
                StatusCode::BAD_REQUEST,
                format!("Unknown book: {}", name),
                None,
            ),
            AppError::RateLimited(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Upstream service rate limited".to_string(),
                Some(msg),
            ),
            AppError::UpstreamUnavailable(msg) | AppError::UpstreamMalformed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch passage".to_string(),
                Some(msg),
            ),
            AppError::GenerationFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AI summary failed".to_string(),
                Some(msg),
            ),
            AppError::ConfigError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error".to_string(),
                Some(msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
                Some(msg),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), None),
        };

        let body = Json(ErrorResponse { error, details });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

impl From<std::env::VarError> for AppError {
    fn from(err: std::env::VarError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::RateLimited => AppError::RateLimited(err.to_string()),
            other => AppError::GenerationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
