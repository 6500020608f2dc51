//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and the single
//! table mapping each variant to an HTTP status and a user-facing message.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use english_coach_core::{GenerationError, PortError, RecoveryError};
use serde::Serialize;
use tracing::{error, warn};

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the persistence port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The content generator failed.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// The model's output could not be recovered as the expected JSON.
    #[error("{0}")]
    Recovery(#[from] RecoveryError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent something we refuse to process.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The record exists but belongs to someone else.
    #[error("Record is owned by another user")]
    NotOwner,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Daily quota of {0} requests reached")]
    QuotaExceeded(u32),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Technical detail attached to every error response as an extension.
///
/// Only development responses move it into the body, see
/// `web::middleware::error_details`.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    msg: String,
    detail: String,
}

impl ErrorReport {
    /// The error response again, with the detail in its `error` field.
    pub fn detailed_response(self, status: StatusCode) -> Response {
        let body = ErrorBody {
            success: false,
            msg: self.msg,
            error: Some(self.detail),
        };
        (status, Json(body)).into_response()
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    /// The status and user-facing message for this error.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service is not configured correctly.".to_string(),
            ),
            ApiError::Port(port) => match port {
                PortError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
                PortError::Duplicate(field) => (
                    StatusCode::BAD_REQUEST,
                    format!("This {} is already registered.", field),
                ),
                PortError::Conflict(_) => (
                    StatusCode::CONFLICT,
                    "This session was updated by another request. Please retry.".to_string(),
                ),
                PortError::Unavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database connection error. Please try again later.".to_string(),
                ),
                PortError::Unexpected(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred. Please try again.".to_string(),
                ),
            },
            ApiError::Generation(err) => {
                let status = match err.root() {
                    GenerationError::NotConfigured(_)
                    | GenerationError::Unauthorized(_)
                    | GenerationError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    GenerationError::EmptyResponse => StatusCode::BAD_GATEWAY,
                    GenerationError::InsufficientCredits(_) | GenerationError::Network(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    GenerationError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                    GenerationError::RetriesExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.user_message().to_string())
            }
            ApiError::Recovery(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AI response parsing failed".to_string(),
            ),
            ApiError::Database(db) => match db {
                sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "Record not found".to_string()),
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database connection error. Please try again later.".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred. Please try again.".to_string(),
                ),
            },
            ApiError::Io(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred. Please try again.".to_string(),
            ),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::NotOwner => (StatusCode::UNAUTHORIZED, "Not authorized".to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::QuotaExceeded(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Daily AI limit reached. Please try again tomorrow.".to_string(),
            ),
        }
    }

    /// Technical detail for development responses.
    fn detail(&self) -> String {
        match self {
            ApiError::Recovery(RecoveryError::MalformedResponse { reason, excerpt }) => {
                format!("{}; raw: {}", reason, excerpt)
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = self.status_and_message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let report = ErrorReport {
            msg: msg.clone(),
            detail: self.detail(),
        };
        let body = ErrorBody {
            success: false,
            msg,
            error: None,
        };
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failures_map_to_their_statuses() {
        let cases = [
            (GenerationError::NotConfigured("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (GenerationError::EmptyResponse, StatusCode::BAD_GATEWAY),
            (GenerationError::InsufficientCredits("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (GenerationError::RateLimited("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (GenerationError::Network("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (GenerationError::Unauthorized("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_and_message().0, expected);
        }
    }

    #[test]
    fn exhausted_rate_limit_is_still_429() {
        let err = GenerationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GenerationError::RateLimited("429 from upstream".into())),
        };
        let (status, msg) = ApiError::from(err).status_and_message();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(!msg.contains("upstream"));
    }

    #[test]
    fn configuration_message_does_not_name_the_credential() {
        let err = ApiError::from(GenerationError::NotConfigured("credential missing".into()));
        let (_, msg) = err.status_and_message();
        assert!(!msg.contains("OPENROUTER"));
        assert!(!msg.contains("KEY"));
    }

    #[test]
    fn technical_detail_travels_beside_the_body() {
        let err = ApiError::from(RecoveryError::MalformedResponse {
            reason: "no complete json object found".into(),
            excerpt: "Sorry, I can't".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<ErrorReport>().cloned().unwrap();
        assert_eq!(report.msg, "AI response parsing failed");
        assert_eq!(report.detail, "no complete json object found; raw: Sorry, I can't");
    }

    #[test]
    fn caller_errors_keep_their_messages() {
        let (status, msg) = ApiError::validation("Please provide a sentence").status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Please provide a sentence");
        assert_eq!(ApiError::NotOwner.status_and_message().0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Port(PortError::Duplicate("email".into())).status_and_message(),
            (StatusCode::BAD_REQUEST, "This email is already registered.".to_string())
        );
    }
}
