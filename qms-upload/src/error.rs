//! Error types for qms-upload
//!
//! Every failure answers `{success: false, message}` so the browser client
//! can show the message as-is.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request or missing file part (400)
    #[error("{0}")]
    BadRequest(String),

    /// Path escapes the upload directory (403)
    #[error("{0}")]
    Forbidden(String),

    /// File not found (404)
    #[error("{0}")]
    NotFound(String),

    /// File larger than the configured maximum (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// File type not on the allow list (415)
    #[error("{0}")]
    UnsupportedType(String),

    /// I/O or other server-side failure (500)
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound("File not found".to_string()),
            _ => ApiError::Internal(format!("File operation failed: {}", err)),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        // The body limit surfaces here as a multipart read error
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::PayloadTooLarge("File exceeds the maximum upload size".to_string())
            }
            _ => ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) => error!("Internal error: {}", msg),
            ApiError::Forbidden(msg) => warn!("Rejected path: {}", msg),
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_404() {
        let err: ApiError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
