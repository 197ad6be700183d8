//! API error handling
//!
//! Author: hephaex@gmail.com

use crate::auth::password::PasswordError;
use crate::auth::AuthError;
use crate::services::{MailError, UploadError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Request body failed field validation
    Validation(String),
    /// Wrong credentials on login or password change
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    /// Bearer token or access policy failure
    Auth(AuthError),
    /// A collaborator (image host) is not configured
    Unavailable(String),
    /// A collaborator returned an error
    Upstream(String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Auth(err) => return err.into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Validation(details) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("VALIDATION_ERROR", "Request validation failed").with_details(details),
            ),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::new("UNAUTHORIZED", msg))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ApiError::new("CONFLICT", msg)),
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new("SERVICE_UNAVAILABLE", msg),
            ),
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "upstream service failed");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError::new("UPSTREAM_ERROR", "Upstream service failed"),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("DATABASE_ERROR", "Database operation failed"),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<contacts_core::ContactsError> for AppError {
    fn from(err: contacts_core::ContactsError) -> Self {
        use contacts_core::ContactsError;

        match err {
            ContactsError::NotFound(msg) => AppError::NotFound(msg),
            ContactsError::Conflict(msg) => AppError::Conflict(msg),
            ContactsError::ValidationError(msg) => AppError::BadRequest(msg),
            ContactsError::DatabaseError(msg) => AppError::Database(msg),
            ContactsError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            ContactsError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<MailError> for AppError {
    fn from(err: MailError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NotConfigured => AppError::Unavailable(err.to_string()),
            UploadError::InvalidImage(msg) => AppError::BadRequest(msg),
            UploadError::Upstream(msg) => AppError::Upstream(msg),
        }
    }
}
