//! Error taxonomy for issuing and scanning payment codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QrError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    /// Bad generation parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Signing or serialization failed while issuing a code.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The scanned text is not a structurally valid payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload expired")]
    Expired,

    #[error("signature mismatch: payload tampered or invalid")]
    TamperedOrInvalidSignature,

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u64),

    /// Reported by the capture collaborator, passed through unchanged.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),

    #[error("unknown display slot")]
    UnknownSlot,
}

impl QrError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QrError::InvalidInput(_) => "invalid_input",
            QrError::GenerationFailed(_) => "generation_failed",
            QrError::MalformedPayload(_) => "malformed_payload",
            QrError::Expired => "expired",
            QrError::TamperedOrInvalidSignature => "tampered_or_invalid_signature",
            QrError::UnsupportedVersion(_) => "unsupported_version",
            QrError::CaptureUnavailable(_) => "capture_unavailable",
            QrError::Unexpected(_) => "unexpected",
            QrError::UnknownSlot => "unknown_slot",
        }
    }

    /// Message shown to the person holding the phone. Every category gets its
    /// own wording so they know whether to rescan or ask for a new code.
    pub fn user_message(&self) -> String {
        match self {
            QrError::InvalidInput(why) => format!("Cannot create a payment code: {why}."),
            QrError::GenerationFailed(_) => "Failed to generate a secure QR code. Please try again.".into(),
            QrError::MalformedPayload(_) => "This QR code could not be read as a payment request.".into(),
            QrError::Expired => "This QR code has expired. Ask the recipient to refresh it.".into(),
            QrError::TamperedOrInvalidSignature => {
                "This QR code failed its security check and may have been tampered with.".into()
            }
            QrError::UnsupportedVersion(v) => {
                format!("This QR code uses payment format version {v}, which this app does not support.")
            }
            QrError::CaptureUnavailable(_) => "Camera permission denied or not available.".into(),
            QrError::Unexpected(_) => "Something went wrong. Please try again.".into(),
            QrError::UnknownSlot => "This payment code is no longer displayed.".into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            QrError::InvalidInput(_) | QrError::MalformedPayload(_) | QrError::UnsupportedVersion(_) => {
                StatusCode::BAD_REQUEST
            }
            QrError::Expired => StatusCode::GONE,
            QrError::TamperedOrInvalidSignature => StatusCode::UNAUTHORIZED,
            QrError::CaptureUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QrError::UnknownSlot => StatusCode::NOT_FOUND,
            QrError::GenerationFailed(_) | QrError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QrError {
    fn into_response(self) -> Response {
        if matches!(self, QrError::Unexpected(_) | QrError::GenerationFailed(_)) {
            tracing::error!("{self}");
        }
        let body = json!({ "error": self.code(), "message": self.user_message() });
        (self.status(), Json(body)).into_response()
    }
}
