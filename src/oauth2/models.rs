// ABOUTME: OAuth 2.0 wire types for the authorize, token, and revoke endpoints
// ABOUTME: RFC 6749 error objects with section-linked error_uri values
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! OAuth 2.0 request/response models

use serde::{Deserialize, Serialize};

/// Query parameters of `GET /oauth/authorize`
///
/// Everything is optional at the parse layer; the orchestrator decides which
/// absences are fatal and which are redirect-reported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    /// Must be `code`
    pub response_type: Option<String>,
    /// Public client identifier
    pub client_id: Option<String>,
    /// Redirect target; must match the client allowlist exactly
    pub redirect_uri: Option<String>,
    /// Space-delimited scopes; defaults to `openid`
    pub scope: Option<String>,
    /// Opaque client state, echoed back on every redirect
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE challenge method (S256 or plain)
    pub code_challenge_method: Option<String>,
    /// OIDC nonce, stored with the code and echoed in the ID token
    pub nonce: Option<String>,
}

/// Form body of `POST /oauth/authorize`: the authorize parameters carried
/// through the login form plus the submitted credentials
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    /// Public client identifier
    pub client_id: Option<String>,
    /// Redirect target
    pub redirect_uri: Option<String>,
    /// Space-delimited scopes
    pub scope: Option<String>,
    /// Opaque client state
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    pub code_challenge_method: Option<String>,
    /// OIDC nonce
    pub nonce: Option<String>,
    /// Submitted email
    pub email: Option<String>,
    /// Submitted password
    pub password: Option<String>,
}

/// Form body of `POST /oauth/token`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// authorization_code, refresh_token, or client_credentials
    pub grant_type: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI the code was bound to
    pub redirect_uri: Option<String>,
    /// Client identifier (body auth)
    pub client_id: Option<String>,
    /// Client secret (body auth)
    pub client_secret: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Requested scopes (client_credentials grant)
    pub scope: Option<String>,
}

/// Successful token response (RFC 6749 §5.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed access token (`typ: at+jwt`)
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Seconds until the access token expires; always the configured TTL
    pub expires_in: i64,
    /// Opaque refresh token, present when `offline_access` was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Signed ID token, present when `openid` was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Granted scopes, space-joined
    pub scope: String,
}

/// Form body of `POST /oauth/revoke` (RFC 7009)
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    /// The token to revoke
    pub token: Option<String>,
    /// Caller's hint; ignored, only refresh tokens are revocable
    pub token_type_hint: Option<String>,
}

/// OAuth 2.0 error response (RFC 6749 §5.2)
///
/// Converts from [`crate::errors::AppError`] at the HTTP boundary; the
/// status mapping lives on [`crate::errors::ErrorCode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable description
    pub error_description: String,
    /// Link to the relevant specification section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    /// Malformed or missing request parameters
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_string()),
        }
    }

    /// Unknown client or failed client authentication
    #[must_use]
    pub fn invalid_client(description: &str) -> Self {
        Self {
            error: "invalid_client".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_string()),
        }
    }

    /// Bad, expired, or reused grant
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_string()),
        }
    }

    /// Grant type not allowed for this client
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: "unauthorized_client".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_string()),
        }
    }

    /// Requested scope outside the client's allowlist
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_string()),
        }
    }

    /// Grant type this server does not implement
    #[must_use]
    pub fn unsupported_grant_type(description: &str) -> Self {
        Self {
            error: "unsupported_grant_type".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_string()),
        }
    }

    /// Response type other than `code`
    #[must_use]
    pub fn unsupported_response_type(description: &str) -> Self {
        Self {
            error: "unsupported_response_type".to_string(),
            error_description: description.to_string(),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_string()),
        }
    }

    /// Internal failure; description is generic in production
    #[must_use]
    pub fn server_error(description: &str) -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: description.to_string(),
            error_uri: None,
        }
    }

    /// HTTP status for this error on the token endpoint
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" => 401,
            "server_error" => 500,
            _ => 400,
        }
    }
}

impl From<&crate::errors::AppError> for OAuth2Error {
    fn from(err: &crate::errors::AppError) -> Self {
        Self {
            error: err.code.wire_name().to_string(),
            error_description: err.message.clone(),
            error_uri: None,
        }
    }
}
