//! Error types for the conversion server
//!
//! Every failure a request can hit is a [`ConvertError`]. Validation errors
//! are raised before any conversion work starts; conversion errors abort a
//! single request; a timeout is fatal to the request but never to the process.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type for conversion operations
pub type ConvertResult<T> = std::result::Result<T, ConvertError>;

/// Conversion error taxonomy
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("File too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Invalid conversion format: {0}")]
    InvalidFormat(String),

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Input could not be read: {0}")]
    Unreadable(String),

    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedRoute { from: String, to: String },

    #[error("Output was not saved correctly at: {0}")]
    WriteVerificationFailed(String),

    #[error("Timeout while converting after {secs}s")]
    Timeout { secs: u64 },

    #[error("Conversion failed: {0}")]
    InternalConversionFailure(String),
}

/// Coarse grouping used for outcome logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Conversion,
    Timeout,
}

impl ConvertError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unreadable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnsupportedRoute { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::WriteVerificationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::InternalConversionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::InvalidFormat(_) => "INVALID_FORMAT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::MalformedRequest(_) => "MALFORMED_REQUEST",
            Self::Unreadable(_) => "UNREADABLE",
            Self::UnsupportedRoute { .. } => "UNSUPPORTED_ROUTE",
            Self::WriteVerificationFailed(_) => "WRITE_VERIFICATION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InternalConversionFailure(_) => "CONVERSION_FAILED",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PayloadTooLarge { .. }
            | Self::InvalidFormat(_)
            | Self::RateLimited { .. }
            | Self::MalformedRequest(_) => ErrorClass::Validation,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Unreadable(_)
            | Self::UnsupportedRoute { .. }
            | Self::WriteVerificationFailed(_)
            | Self::InternalConversionFailure(_) => ErrorClass::Conversion,
        }
    }

    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        Self::InternalConversionFailure(err.to_string())
    }

    pub(crate) fn unreadable(err: impl std::fmt::Display) -> Self {
        Self::Unreadable(err.to_string())
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        } else {
            tracing::info!(code = self.code(), "Request rejected: {}", self);
        }

        let retry_after = match &self {
            Self::RateLimited { retry_after_secs } => {
                HeaderValue::from_str(&retry_after_secs.to_string()).ok()
            }
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        });

        let mut response = (status, body).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
