// ABOUTME: Centralized error handling and error types for the auth service
// ABOUTME: Maps service-level error kinds to HTTP statuses and response bodies
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Unified Error Handling System
//!
//! Service functions return an [`AppError`] tagged with an [`ErrorCode`];
//! the HTTP layer maps codes to statuses and renders the
//! `{"message": ..., "docUrl"?: ...}` body. OAuth provider endpoints use
//! their own RFC 6749 error shape (see [`crate::oauth2::models::OAuthError`]).
//! Service code never crosses the boundary with HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Authentication & Authorization
    /// Authentication is required but not provided
    AuthRequired,
    /// Bearer credential is invalid, expired, or revoked
    AuthInvalid,
    /// Credential is valid but lacks the required scope
    PermissionDenied,
    /// Email/password pair did not match a user (identical for unknown email)
    InvalidCredentials,
    /// Login succeeded but MFA verification is still required
    MfaRequired,

    // Identity lifecycle
    /// Registration attempted with an email that is already taken
    EmailTaken,
    /// Refresh token did not match an unexpired session
    InvalidRefreshToken,
    /// Password-reset token is invalid or expired
    InvalidResetToken,
    /// Email-verification token is invalid or expired
    InvalidVerifyToken,
    /// Magic-link token is invalid or expired
    InvalidMagicLinkToken,
    /// SMS code is wrong, expired, or consumed
    InvalidSmsCode,
    /// SMS MFA enrollment already completed
    MfaAlreadyEnrolled,

    // Rate limiting
    /// Sliding-window rate limit exceeded
    RateLimitExceeded,
    /// SMS daily circuit breaker tripped
    DailyLimitExceeded,

    // Validation & resources
    /// Input validation failed
    InvalidInput,
    /// Requested resource was not found
    ResourceNotFound,

    // Internal
    /// Internal server error
    InternalError,
    /// Database operation failed
    DatabaseError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidInput
            | Self::InvalidResetToken
            | Self::InvalidVerifyToken
            | Self::InvalidMagicLinkToken
            | Self::MfaAlreadyEnrolled => StatusCode::BAD_REQUEST,

            Self::AuthRequired
            | Self::AuthInvalid
            | Self::InvalidCredentials
            | Self::MfaRequired
            | Self::InvalidRefreshToken
            | Self::InvalidSmsCode => StatusCode::UNAUTHORIZED,

            Self::PermissionDenied => StatusCode::FORBIDDEN,

            Self::ResourceNotFound => StatusCode::NOT_FOUND,

            Self::EmailTaken => StatusCode::CONFLICT,

            Self::RateLimitExceeded | Self::DailyLimitExceeded => StatusCode::TOO_MANY_REQUESTS,

            Self::InternalError | Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-safe description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication required",
            Self::AuthInvalid => "Invalid or expired credential",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::InvalidCredentials => "Invalid email or password",
            Self::MfaRequired => "MFA verification required",
            Self::EmailTaken => "An account with this email already exists",
            Self::InvalidRefreshToken => "Invalid or expired refresh token",
            Self::InvalidResetToken => "Invalid or expired password reset token",
            Self::InvalidVerifyToken => "Invalid or expired verification token",
            Self::InvalidMagicLinkToken => "Invalid or expired magic link",
            Self::InvalidSmsCode => "Invalid or expired SMS code",
            Self::MfaAlreadyEnrolled => "SMS MFA is already enrolled",
            Self::RateLimitExceeded => "Rate limit exceeded. Please slow down your requests",
            Self::DailyLimitExceeded => "Daily SMS limit exceeded",
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
        }
    }
}

/// Application error carrying a code and a human-readable message
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional documentation link surfaced to the client
    pub doc_url: Option<String>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            doc_url: None,
        }
    }

    /// Attach a documentation URL to the error
    #[must_use]
    pub fn with_doc_url(mut self, doc_url: impl Into<String>) -> Self {
        self.doc_url = Some(doc_url.into());
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Message safe for client exposure. Internal details are replaced with
    /// the generic code description and logged instead.
    #[must_use]
    pub fn sanitized_message(&self) -> String {
        match self.code {
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                self.code.description().to_owned()
            }
            _ => self.message.clone(),
        }
    }

    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, ErrorCode::AuthRequired.description())
    }

    /// Invalid bearer credential
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Email/password mismatch, identical for unknown email
    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::new(
            ErrorCode::InvalidCredentials,
            ErrorCode::InvalidCredentials.description(),
        )
    }

    /// Input validation failure with a field-specific message
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::new(ErrorCode::ResourceNotFound, format!("{resource} not found"))
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

/// HTTP error response body: `{"message": ..., "docUrl"?: ...}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message (sanitized for the client)
    pub message: String,
    /// Optional documentation link
    #[serde(rename = "docUrl", skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            message: error.sanitized_message(),
            doc_url: error.doc_url,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(code = ?self.code, "request failed: {}", self.message);
        } else {
            tracing::debug!(code = ?self.code, "request rejected: {}", self.message);
        }
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation(format!("JSON error: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ErrorCode::InvalidCredentials.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::EmailTaken.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::DailyLimitExceeded.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::InvalidInput.http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_details_are_sanitized() {
        let err = AppError::database("UNIQUE constraint failed: users.email");
        assert_eq!(err.sanitized_message(), "Database operation failed");

        let err = AppError::validation("password must be at least 8 characters");
        assert_eq!(
            err.sanitized_message(),
            "password must be at least 8 characters"
        );
    }
}
