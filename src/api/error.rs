use crate::services::detector::InferenceError;
use crate::utils::validation::ValidationError;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Message returned for every server-side failure. Details stay in the logs.
pub const GENERIC_SERVER_ERROR: &str = "An error occurred while processing the CT scan";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Malformed multipart request: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::Staging(_) | AppError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Multipart(e) => e.body_text(),
            AppError::Staging(e) => {
                tracing::error!("Staging error: {:?}", e);
                GENERIC_SERVER_ERROR.to_string()
            }
            // Already logged with the staged path by the detection service
            AppError::Inference(_) => GENERIC_SERVER_ERROR.to_string(),
        };

        (status, message).into_response()
    }
}
