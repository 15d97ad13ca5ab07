//! HTTP-facing error types.
//!
//! Every variant maps to a stable error code.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::MissingParameter { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// API errors expressed as a Rust enum.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required query parameter was absent or empty.
    #[error("{message}")]
    MissingParameter { message: String },

    /// A request argument is not acceptable.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// No API key, or one we do not recognize.
    #[error("A valid API key is required")]
    InvalidCredentials,

    /// The caller is authenticated but not an administrator.
    #[error("Only administrators may perform this operation")]
    NotAuthorized,

    /// The requested resource does not exist.
    #[error("{message}")]
    ResourceNotFound { message: String },

    /// The request body could not be parsed.
    #[error("{message}")]
    InvalidContent { message: String },

    /// One or more assets in an upload request failed.
    #[error("({caller}) Unable to upload one or more assets!")]
    UploadFailed { caller: String },

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    InternalError(#[from] anyhow::Error),
}

impl ApiError {
    /// Return the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingParameter { .. } => "MissingParameter",
            ApiError::InvalidArgument { .. } => "InvalidArgument",
            ApiError::InvalidCredentials => "InvalidCredentials",
            ApiError::NotAuthorized => "NotAuthorized",
            ApiError::ResourceNotFound { .. } => "ResourceNotFound",
            ApiError::InvalidContent { .. } => "InvalidContent",
            ApiError::UploadFailed { .. } => "UploadFailed",
            ApiError::InternalError(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter { .. } => StatusCode::CONFLICT,
            ApiError::InvalidArgument { .. } => StatusCode::CONFLICT,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotAuthorized => StatusCode::FORBIDDEN,
            ApiError::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::InvalidContent { .. } => StatusCode::BAD_REQUEST,
            ApiError::UploadFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let ApiError::InternalError(ref err) = self {
            tracing::error!("Internal error: {:#}", err);
        }

        // Upload failures keep the flat `{error}` body that upload clients expect.
        let body = match self {
            ApiError::UploadFailed { .. } => json!({ "error": self.to_string() }),
            _ => json!({ "code": self.code(), "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
