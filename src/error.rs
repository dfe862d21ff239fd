//! Error types for the OCR gateway
//!
//! Every failure a request can hit maps to one of the categories below, and
//! every category maps to a stable machine-readable code plus an HTTP status.
//! Underlying causes are preserved in the `Display` output for logging; the
//! body sent to the caller only ever carries the sanitized detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, OcrError>;

/// Request-processing error taxonomy
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("invalid request parameter: {0}")]
    InvalidParameter(String),

    #[error("unsafe URL rejected: {0}")]
    UnsafeUrl(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("OCR engine is not ready")]
    EngineNotReady,

    #[error("OCR engine initialization failed: {0}")]
    InitializationFailed(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Stable error code included in every error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "IMAGE_TOO_LARGE",
            Self::InvalidImage(_) | Self::UnsafeUrl(_) | Self::InvalidParameter(_) => {
                "INVALID_IMAGE"
            }
            Self::DownloadFailed(_) => "DOWNLOAD_ERROR",
            Self::EngineNotReady | Self::InferenceFailed(_) | Self::InitializationFailed(_) => {
                "OCR_PROCESSING_ERROR"
            }
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidImage(_)
            | Self::UnsafeUrl(_)
            | Self::InvalidParameter(_)
            | Self::DownloadFailed(_) => StatusCode::BAD_REQUEST,
            Self::EngineNotReady
            | Self::InferenceFailed(_)
            | Self::InitializationFailed(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human-readable headline for the envelope `message` field
    pub fn message(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "Image file too large",
            Self::InvalidImage(_) | Self::UnsafeUrl(_) => "Invalid image file",
            Self::InvalidParameter(_) => "Invalid request parameter",
            Self::DownloadFailed(_) => "Failed to download image",
            Self::EngineNotReady | Self::InferenceFailed(_) | Self::InitializationFailed(_) => {
                "OCR processing failed"
            }
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Detail text safe to echo to an untrusted caller.
    ///
    /// Validation errors carry messages we composed ourselves, so those pass
    /// through. Transport and engine faults may embed upstream error strings;
    /// they are replaced by a generic line and the full cause stays in logs.
    pub fn public_detail(&self) -> String {
        match self {
            Self::TooLarge { .. }
            | Self::InvalidImage(_)
            | Self::UnsafeUrl(_)
            | Self::InvalidParameter(_) => self.to_string(),
            Self::DownloadFailed(_) => "could not retrieve the image from the given URL".into(),
            Self::EngineNotReady => "OCR engine is not ready".into(),
            Self::InferenceFailed(_) | Self::InitializationFailed(_) => {
                "the OCR engine could not process this image".into()
            }
            Self::Internal(_) => "an internal error occurred".into(),
        }
    }
}

/// Error envelope body: `{success, message, error: {code, detail}, request_id}`
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: &'static str,
    error: ErrorDetail,
    request_id: Uuid,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    detail: String,
}

/// An [`OcrError`] tagged with the request correlation id, ready to render.
#[derive(Debug)]
pub struct ApiError {
    pub request_id: Uuid,
    pub error: OcrError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.error, "request failed");
        } else {
            tracing::warn!(request_id = %self.request_id, error = %self.error, "request rejected");
        }

        let body = Json(ErrorBody {
            success: false,
            message: self.error.message(),
            error: ErrorDetail {
                code: self.error.code(),
                detail: self.error.public_detail(),
            },
            request_id: self.request_id,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_taxonomy() {
        assert_eq!(OcrError::TooLarge { size: 2, limit: 1 }.code(), "IMAGE_TOO_LARGE");
        assert_eq!(OcrError::InvalidImage("x".into()).code(), "INVALID_IMAGE");
        assert_eq!(OcrError::UnsafeUrl("x".into()).code(), "INVALID_IMAGE");
        assert_eq!(OcrError::InvalidParameter("x".into()).code(), "INVALID_IMAGE");
        assert_eq!(OcrError::DownloadFailed("x".into()).code(), "DOWNLOAD_ERROR");
        assert_eq!(OcrError::EngineNotReady.code(), "OCR_PROCESSING_ERROR");
        assert_eq!(OcrError::InferenceFailed("x".into()).code(), "OCR_PROCESSING_ERROR");
        assert_eq!(OcrError::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            OcrError::TooLarge { size: 2, limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(OcrError::UnsafeUrl("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(OcrError::DownloadFailed("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OcrError::EngineNotReady.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn parameter_errors_do_not_blame_the_image() {
        let err = OcrError::InvalidParameter("unknown output mode 'xml'".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Invalid request parameter");
        assert!(!err.public_detail().contains("invalid image"));
    }

    #[test]
    fn transport_detail_is_not_echoed() {
        let err = OcrError::DownloadFailed("connect error: 10.0.0.1:443 refused".into());
        assert!(!err.public_detail().contains("10.0.0.1"));
    }
}
