//! Admission errors and their HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::security::rate_limit::{retry_after_secs, RateLimitExceeded};
use crate::security::token::{IssueError, TokenError};
use crate::security::validation::ValidationError;

/// Why a request was refused by the admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    #[error(transparent)]
    Unauthorized(#[from] TokenError),
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationError),
    /// The body of a write request exceeded the configured limit. Checked
    /// after throttling, before the token.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl AdmissionError {
    /// Which guard produced the error.
    pub fn guard(&self) -> &'static str {
        match self {
            AdmissionError::RateLimited(_) => "rate_limit",
            AdmissionError::Unauthorized(_) => "auth",
            AdmissionError::Invalid(_) => "validation",
            AdmissionError::PayloadTooLarge { .. } => "body_limit",
        }
    }

    /// Short reason label, finer than [`guard`](Self::guard).
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::RateLimited(_) => "exceeded",
            AdmissionError::Unauthorized(e) => e.kind(),
            AdmissionError::Invalid(_) => "invalid_input",
            AdmissionError::PayloadTooLarge { .. } => "too_large",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AdmissionError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AdmissionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AdmissionError::Invalid(_) => StatusCode::BAD_REQUEST,
            AdmissionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AdmissionError::RateLimited(e) => {
                let secs = retry_after_secs(e.retry_after);
                let mut response = (
                    status,
                    Json(json!({ "error": "Too many requests", "retry_after": secs })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            // Verification failures share one message; only absence is told apart.
            AdmissionError::Unauthorized(TokenError::MissingToken) => {
                (status, Json(json!({ "error": "Missing token" }))).into_response()
            }
            AdmissionError::Unauthorized(_) => {
                (status, Json(json!({ "error": "Invalid token" }))).into_response()
            }
            AdmissionError::Invalid(e) => (
                status,
                Json(json!({ "error": "Invalid input", "reason": e.reason })),
            )
                .into_response(),
            AdmissionError::PayloadTooLarge { .. } => {
                (status, Json(json!({ "error": "Payload too large" }))).into_response()
            }
        }
    }
}

impl IntoResponse for IssueError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Token issuance failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal error" })),
        )
            .into_response()
    }
}
