use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use thiserror::Error;
use tracing::error;

use roster_types::api::FailureResponse;

/// Every failure the backend hands back to a caller.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("You do not have permission to do that")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The mock uploader never produces this; a real object store will.
    #[error("Upload failed: {0}")]
    UploadFailure(String),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl BackendError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UploadFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Keep storage internals out of responses
            Self::Storage(e) => {
                error!("Storage error: {:#}", e);
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };

        (
            self.status(),
            Json(FailureResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}
