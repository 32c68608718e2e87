// ABOUTME: Domain models for users, clients, codes, refresh tokens, and JWT claims
// ABOUTME: Claim payloads are closed structs; serialization never goes through ad-hoc maps
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Domain Models
//!
//! Rows as stored plus the ephemeral claim sets. Authorization codes and
//! refresh tokens carry only digest columns; the raw secrets exist solely in
//! transit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered end user
#[derive(Debug, Clone)]
pub struct User {
    /// Stable identifier
    pub id: Uuid,
    /// Unique email, stored lowercased
    pub email: String,
    /// Whether the email address has been verified
    pub email_verified: bool,
    /// bcrypt password hash; never leaves the orchestrator boundary
    pub password_hash: String,
    /// Display name for the `name` ID token claim
    pub display_name: Option<String>,
    /// Consecutive failed login attempts; reset to 0 on success
    pub failed_login_attempts: i64,
    /// Lockout expiry; set when attempts reach the configured maximum
    pub locked_until: Option<DateTime<Utc>>,
    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A registered OAuth client application
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Row identifier
    pub id: Uuid,
    /// Public client identifier
    pub client_id: String,
    /// SHA-256 hex of the client secret; None for public clients
    pub client_secret_hash: Option<String>,
    /// Human-readable client name
    pub name: String,
    /// Exact-match redirect URI allowlist
    pub redirect_uris: Vec<String>,
    /// Scopes this client may request
    pub allowed_scopes: Vec<String>,
    /// Grant types this client may use
    pub allowed_grant_types: Vec<String>,
    /// Whether the client can hold a secret
    pub is_confidential: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Exact-match redirect URI check; no prefix or normalization matching
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// Every requested scope must be present in the client's allowed set
    #[must_use]
    pub fn are_scopes_allowed(&self, requested: &[String]) -> bool {
        requested
            .iter()
            .all(|scope| self.allowed_scopes.contains(scope))
    }

    /// Whether the client may use the given grant type
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        self.allowed_grant_types
            .iter()
            .any(|allowed| allowed == grant_type)
    }
}

/// A one-time authorization code, stored by digest
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// SHA-256 hex of the raw code; the lookup key
    pub code_hash: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Authenticated user the code represents
    pub user_id: Uuid,
    /// Redirect URI bound at issuance; must match exactly at redemption
    pub redirect_uri: String,
    /// Granted scopes, space-joined
    pub scope: String,
    /// PKCE challenge; present iff `code_challenge_method` is present
    pub code_challenge: Option<String>,
    /// PKCE challenge method (S256 or plain)
    pub code_challenge_method: Option<String>,
    /// OIDC nonce from the authorize request, echoed into the ID token
    pub nonce: Option<String>,
    /// Expiry; codes are short-lived
    pub expires_at: DateTime<Utc>,
    /// Redemption timestamp; a non-null value means the code is permanently dead
    pub used_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A refresh token row, stored by digest
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Row identifier
    pub id: Uuid,
    /// SHA-256 hex of the raw token; the lookup key
    pub token_hash: String,
    /// Owning user
    pub user_id: Uuid,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes, space-joined
    pub scope: String,
    /// User agent captured at issuance
    pub user_agent: Option<String>,
    /// Client IP captured at issuance
    pub ip_address: Option<String>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Revocation timestamp; set on rotation, explicit revoke, or reuse detection
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Whether the token is currently acceptable
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Access token claims (`typ: at+jwt`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: user id, or client id for client_credentials grants
    pub sub: String,
    /// Issuer URL
    pub iss: String,
    /// Audience: the client the token was issued to
    pub aud: String,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Granted scopes, space-joined
    pub scope: String,
    /// Client the token was issued to
    pub client_id: String,
}

/// ID token claims (`typ: JWT`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject: user id
    pub sub: String,
    /// Issuer URL
    pub iss: String,
    /// Audience: the requesting client
    pub aud: String,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Time of the authentication event
    pub auth_time: i64,
    /// Nonce echoed from the authorize request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Email, present when the `email` scope was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Email verification state, paired with `email`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Display name, present when the `profile` scope was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Binds this ID token to the access token issued alongside it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
}
