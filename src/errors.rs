// ABOUTME: Unified error handling for the authorization server
// ABOUTME: Maps error kinds to RFC 6749 wire codes and HTTP statuses as a pure function
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Unified Error Handling
//!
//! Defines the closed set of error kinds the server can surface, their
//! RFC 6749 wire names, and the pure `ErrorCode -> HTTP status` mapping the
//! handlers rely on. Control flow uses typed results, never exceptions-style
//! string matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // OAuth 2.0 protocol errors (1000-1999), wire names per RFC 6749 §5.2
    #[serde(rename = "invalid_request")]
    InvalidRequest = 1000,
    #[serde(rename = "invalid_client")]
    InvalidClient = 1001,
    #[serde(rename = "invalid_grant")]
    InvalidGrant = 1002,
    #[serde(rename = "unauthorized_client")]
    UnauthorizedClient = 1003,
    #[serde(rename = "invalid_scope")]
    InvalidScope = 1004,
    #[serde(rename = "unsupported_grant_type")]
    UnsupportedGrantType = 1005,
    #[serde(rename = "unsupported_response_type")]
    UnsupportedResponseType = 1006,

    // Authentication outcomes (2000-2999), never exposed on the wire
    // individually: the login form shows one generic message for all of them
    #[serde(rename = "invalid_credentials")]
    InvalidCredentials = 2000,
    #[serde(rename = "account_locked")]
    AccountLocked = 2001,

    // Configuration (6000-6999)
    #[serde(rename = "config_error")]
    ConfigError = 6000,

    // Internal errors (9000-9999)
    #[serde(rename = "server_error")]
    InternalError = 9000,
    #[serde(rename = "database_error")]
    DatabaseError = 9001,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::InvalidScope
            | Self::UnsupportedGrantType
            | Self::UnsupportedResponseType => 400,

            // 401 Unauthorized
            Self::InvalidClient | Self::InvalidCredentials | Self::AccountLocked => 401,

            // 500 Internal Server Error
            Self::ConfigError | Self::InternalError | Self::DatabaseError => 500,
        }
    }

    /// RFC 6749 wire name for this error
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::InvalidScope => "invalid_scope",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            // Credential failures are reported through the login form, not the
            // token endpoint, but keep a wire name for completeness
            Self::InvalidCredentials | Self::AccountLocked => "access_denied",
            Self::ConfigError | Self::InternalError | Self::DatabaseError => "server_error",
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "The request is missing a parameter or is otherwise malformed",
            Self::InvalidClient => "Client authentication failed",
            Self::InvalidGrant => {
                "The provided authorization grant is invalid, expired, or revoked"
            }
            Self::UnauthorizedClient => "The client is not authorized to use this grant type",
            Self::InvalidScope => "The requested scope is invalid or exceeds the granted scope",
            Self::UnsupportedGrantType => "The grant type is not supported by this server",
            Self::UnsupportedResponseType => "Only the 'code' response type is supported",
            Self::InvalidCredentials => "Invalid email or password",
            Self::AccountLocked => "Invalid email or password",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error for chaining
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Malformed or missing request parameters
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Unknown client or failed client authentication
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidClient, message)
    }

    /// Bad, expired, or reused authorization code / refresh token
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, message)
    }

    /// Grant type not allowed for this client
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnauthorizedClient, message)
    }

    /// Requested scope outside the client's allowlist
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidScope, message)
    }

    /// Internal error, detail suppressed outside development
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// HTTP status for this error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.wire_name(), self.message)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, "Database operation failed").with_source(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::InvalidRequest.http_status(), 400);
        assert_eq!(ErrorCode::InvalidGrant.http_status(), 400);
        assert_eq!(ErrorCode::UnauthorizedClient.http_status(), 400);
        assert_eq!(ErrorCode::InvalidScope.http_status(), 400);
        assert_eq!(ErrorCode::UnsupportedGrantType.http_status(), 400);
        assert_eq!(ErrorCode::InvalidClient.http_status(), 401);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
        assert_eq!(ErrorCode::DatabaseError.http_status(), 500);
    }

    #[test]
    fn test_wire_names_match_rfc6749() {
        assert_eq!(ErrorCode::InvalidRequest.wire_name(), "invalid_request");
        assert_eq!(ErrorCode::InvalidClient.wire_name(), "invalid_client");
        assert_eq!(ErrorCode::InvalidGrant.wire_name(), "invalid_grant");
        assert_eq!(
            ErrorCode::UnsupportedGrantType.wire_name(),
            "unsupported_grant_type"
        );
        assert_eq!(ErrorCode::InternalError.wire_name(), "server_error");
    }

    #[test]
    fn test_credential_failures_share_one_message() {
        // Account enumeration defense: locked and wrong-password read identically
        assert_eq!(
            ErrorCode::InvalidCredentials.description(),
            ErrorCode::AccountLocked.description()
        );
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::invalid_grant("authorization code expired");
        assert_eq!(err.to_string(), "invalid_grant: authorization code expired");
        assert_eq!(err.http_status(), 400);
    }
}
