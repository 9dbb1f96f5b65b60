use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::extract::ExtractError;
use crate::fetch::FetchError;
use crate::llm_client::contract::ModelError;
use crate::pipeline::PipelineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Bodies are plain text: a short description the caller can show as-is.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        let err = match self {
            AppError::Validation(_) => return StatusCode::BAD_REQUEST,
            AppError::Pipeline(err) => err,
        };

        match err {
            PipelineError::Extract(ExtractError::UnsupportedType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            PipelineError::Extract(ExtractError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Extract(ExtractError::ParseFailure(_)) => StatusCode::BAD_REQUEST,

            PipelineError::Fetch(FetchError::BlockedHost { .. }) => StatusCode::FORBIDDEN,
            PipelineError::Fetch(FetchError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Fetch(
                FetchError::InvalidUrl(_)
                | FetchError::InvalidScheme(_)
                | FetchError::TooManyRedirects(_),
            ) => StatusCode::BAD_REQUEST,
            PipelineError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Fetch(FetchError::Upstream(_)) => StatusCode::BAD_GATEWAY,

            PipelineError::Model(ModelError::QuotaExceeded(_)) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Model(ModelError::Upstream(_) | ModelError::SchemaViolation { .. }) => {
                StatusCode::BAD_GATEWAY
            }

            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Upstream detail (provider bodies, model output) stays in the logs.
            AppError::Pipeline(PipelineError::Model(ModelError::SchemaViolation { .. })) => {
                "the model did not return a usable answer; please try again".to_string()
            }
            AppError::Pipeline(PipelineError::Model(ModelError::Upstream(_))) => {
                "the language model is unavailable; please try again later".to_string()
            }
            AppError::Pipeline(PipelineError::Model(ModelError::QuotaExceeded(_))) => {
                "the language model quota is exhausted; please try again later".to_string()
            }
            other => other.to_string(),
        };

        (status, message).into_response()
    }
}
