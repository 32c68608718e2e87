// ABOUTME: The authorization/token orchestrator: grant state machines and token issuance
// ABOUTME: Composes the client registry, user directory, code/token stores, and key manager
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Authorization Server Orchestrator
//!
//! The protocol core. Validation errors discovered before the redirect URI is
//! confirmed trustworthy surface as direct HTTP errors; once the redirect
//! target is trusted, errors are communicated by redirecting to it. Code
//! redemption is exactly-once: the store's conditional update is the
//! exclusivity point, and a spent code presented again revokes every live
//! refresh token for that user/client pair.

use crate::audit::{self, AuditContext, AuditEvent};
use crate::config::ServerConfig;
use crate::crypto;
use crate::database::Database;
use crate::errors::AppError;
use crate::keys::KeyManager;
use crate::models::{
    AccessTokenClaims, AuthorizationCode, IdTokenClaims, OAuthClient, RefreshToken, User,
};
use crate::oauth2::models::{AuthorizeParams, OAuth2Error, TokenRequest, TokenResponse};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// Scopes this server understands
pub const SUPPORTED_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Client credentials extracted from the token request
///
/// Routes populate this from the Basic authorization header when present,
/// falling back to the form body; the header takes precedence when both are
/// given.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    /// Public client identifier
    pub client_id: Option<String>,
    /// Client secret, if presented
    pub client_secret: Option<String>,
}

/// A fully validated authorize request
#[derive(Debug, Clone)]
pub struct ValidatedAuthorize {
    /// The resolved client
    pub client: OAuthClient,
    /// The exact-matched redirect URI
    pub redirect_uri: String,
    /// Requested scopes (defaulted to `openid` when absent)
    pub scopes: Vec<String>,
    /// Client state to echo on redirects
    pub state: Option<String>,
    /// PKCE challenge pair, both present or both absent
    pub code_challenge: Option<String>,
    /// PKCE method (S256 or plain)
    pub code_challenge_method: Option<String>,
    /// OIDC nonce, carried through to the ID token
    pub nonce: Option<String>,
}

/// How a rejected authorize request must be reported
#[derive(Debug)]
pub enum AuthorizeRejection {
    /// The redirect target is not yet trusted: respond directly with 400
    Fatal(OAuth2Error),
    /// The redirect target is trusted: send the error back to the client
    Redirect {
        /// Validated redirect URI
        redirect_uri: String,
        /// Client state to preserve
        state: Option<String>,
        /// The protocol error
        error: OAuth2Error,
    },
}

/// The authorization/token orchestrator
pub struct AuthorizationServer {
    config: Arc<ServerConfig>,
    database: Arc<Database>,
    keys: Arc<KeyManager>,
}

impl AuthorizationServer {
    /// Create the orchestrator over its collaborators
    #[must_use]
    pub fn new(config: Arc<ServerConfig>, database: Arc<Database>, keys: Arc<KeyManager>) -> Self {
        Self {
            config,
            database,
            keys,
        }
    }

    /// Validate an authorize request
    ///
    /// Client resolution and exact redirect URI matching happen first; their
    /// failures are fatal because the redirect target is unverified. Every
    /// later failure redirects back to the client with `state` preserved.
    ///
    /// # Errors
    /// Returns an [`AuthorizeRejection`] describing how to report the failure
    pub async fn validate_authorize(
        &self,
        input: &AuthorizeParams,
    ) -> Result<ValidatedAuthorize, AuthorizeRejection> {
        let Some(client_id) = input.client_id.as_deref().filter(|v| !v.is_empty()) else {
            return Err(AuthorizeRejection::Fatal(OAuth2Error::invalid_request(
                "client_id is required",
            )));
        };
        let Some(redirect_uri) = input.redirect_uri.as_deref().filter(|v| !v.is_empty()) else {
            return Err(AuthorizeRejection::Fatal(OAuth2Error::invalid_request(
                "redirect_uri is required",
            )));
        };

        let client = match self.database.get_client(client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                return Err(AuthorizeRejection::Fatal(OAuth2Error::invalid_request(
                    "Unknown client",
                )));
            }
            Err(err) => {
                return Err(AuthorizeRejection::Fatal(self.internal("client lookup", &err)));
            }
        };

        // Exact match only; a mismatch is a fatal 400, never a redirect,
        // since the target itself is what failed verification
        if !client.is_redirect_uri_allowed(redirect_uri) {
            return Err(AuthorizeRejection::Fatal(OAuth2Error::invalid_request(
                "redirect_uri is not registered for this client",
            )));
        }

        if input.response_type.as_deref() != Some("code") {
            return Err(AuthorizeRejection::Fatal(
                OAuth2Error::unsupported_response_type("response_type must be 'code'"),
            ));
        }

        // The redirect target is trusted from here on
        let redirect = |error: OAuth2Error| AuthorizeRejection::Redirect {
            redirect_uri: redirect_uri.to_string(),
            state: input.state.clone(),
            error,
        };

        if !client.is_grant_type_allowed("authorization_code") {
            return Err(redirect(OAuth2Error::unauthorized_client(
                "Client is not allowed the authorization_code grant",
            )));
        }

        let scopes = parse_scope(input.scope.as_deref());
        if !client.are_scopes_allowed(&scopes) {
            return Err(redirect(OAuth2Error::invalid_scope(
                "Requested scope exceeds the client's allowed scopes",
            )));
        }

        if input.code_challenge.is_some() {
            match input.code_challenge_method.as_deref() {
                Some("S256" | "plain") => {}
                Some(_) => {
                    return Err(redirect(OAuth2Error::invalid_request(
                        "code_challenge_method must be S256 or plain",
                    )));
                }
                None => {
                    return Err(redirect(OAuth2Error::invalid_request(
                        "code_challenge_method is required when code_challenge is present",
                    )));
                }
            }
        }

        Ok(ValidatedAuthorize {
            client,
            redirect_uri: redirect_uri.to_string(),
            scopes,
            state: input.state.clone(),
            code_challenge: input.code_challenge.clone(),
            code_challenge_method: input
                .code_challenge
                .is_some()
                .then(|| input.code_challenge_method.clone())
                .flatten(),
            nonce: input.nonce.clone(),
        })
    }

    /// Mint and persist an authorization code for an authenticated user
    ///
    /// Returns the raw code for the redirect; only its digest is stored.
    ///
    /// # Errors
    /// Returns a server error if storage fails
    pub async fn issue_authorization_code(
        &self,
        authorize: &ValidatedAuthorize,
        user_id: Uuid,
        context: &AuditContext,
    ) -> Result<String, OAuth2Error> {
        let now = Utc::now();
        let raw_code = crypto::generate_token(crypto::OPAQUE_TOKEN_BYTES);

        let code = AuthorizationCode {
            code_hash: crypto::hash_token(&raw_code),
            client_id: authorize.client.client_id.clone(),
            user_id,
            redirect_uri: authorize.redirect_uri.clone(),
            scope: authorize.scopes.join(" "),
            code_challenge: authorize.code_challenge.clone(),
            code_challenge_method: authorize.code_challenge_method.clone(),
            nonce: authorize.nonce.clone(),
            expires_at: now + Duration::seconds(self.config.tokens.auth_code_ttl_secs),
            used_at: None,
            created_at: now,
        };

        self.database
            .store_auth_code(&code)
            .await
            .map_err(|err| self.internal("storing authorization code", &err))?;

        audit::record(
            AuditEvent::AuthorizationGranted,
            Some(user_id),
            Some(&authorize.client.client_id),
            context,
            "",
        );

        Ok(raw_code)
    }

    /// Handle `POST /oauth/token` for all grant types
    ///
    /// # Errors
    /// Returns the RFC 6749 error object to send to the caller
    pub async fn token(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
        context: &AuditContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        let client = self.authenticate_client(credentials).await?;

        match request.grant_type.as_deref() {
            Some("authorization_code") => {
                self.authorization_code_grant(&client, request, context).await
            }
            Some("refresh_token") => self.refresh_token_grant(&client, request, context).await,
            Some("client_credentials") => {
                self.client_credentials_grant(&client, request, context).await
            }
            Some(other) => Err(OAuth2Error::unsupported_grant_type(&format!(
                "Unsupported grant_type: {other}"
            ))),
            None => Err(OAuth2Error::invalid_request("grant_type is required")),
        }
    }

    /// Handle `POST /oauth/revoke` (RFC 7009)
    ///
    /// Revoking an unknown token is a silent no-op so callers cannot probe
    /// token validity. Always succeeds.
    pub async fn revoke(&self, token: &str, context: &AuditContext) {
        let token_hash = crypto::hash_token(token);
        match self
            .database
            .revoke_refresh_token(&token_hash, Utc::now())
            .await
        {
            Ok(true) => {
                audit::record(AuditEvent::TokenRevoked, None, None, context, "");
            }
            Ok(false) => {}
            Err(err) => {
                // Still report success to the caller per RFC 7009
                error!("Failed to revoke refresh token: {err:#}");
            }
        }
    }

    /// Authenticate the client on the token endpoint
    ///
    /// Confidential clients must present a valid secret; public clients must
    /// not present one at all.
    async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, OAuth2Error> {
        let Some(client_id) = credentials.client_id.as_deref().filter(|v| !v.is_empty()) else {
            return Err(OAuth2Error::invalid_client("Client authentication required"));
        };

        let client = self
            .database
            .get_client(client_id)
            .await
            .map_err(|err| self.internal("client lookup", &err))?
            .ok_or_else(|| OAuth2Error::invalid_client("Client authentication failed"))?;

        if client.is_confidential {
            let Some(secret) = credentials.client_secret.as_deref().filter(|v| !v.is_empty())
            else {
                return Err(OAuth2Error::invalid_client("Client authentication failed"));
            };
            self.database
                .validate_client_credentials(client_id, secret)
                .await
                .map_err(|err| self.internal("client credential validation", &err))?
                .ok_or_else(|| OAuth2Error::invalid_client("Client authentication failed"))
        } else {
            // A public client has no secret to verify; accepting one silently
            // would mask misconfigured callers
            if credentials.client_secret.as_deref().is_some_and(|s| !s.is_empty()) {
                return Err(OAuth2Error::invalid_request(
                    "Public clients must not present a client_secret",
                ));
            }
            Ok(client)
        }
    }

    async fn authorization_code_grant(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        context: &AuditContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        const BAD_CODE: &str = "Authorization code is invalid, expired, or revoked";

        let Some(code) = request.code.as_deref().filter(|v| !v.is_empty()) else {
            return Err(OAuth2Error::invalid_request("code is required"));
        };
        let Some(redirect_uri) = request.redirect_uri.as_deref().filter(|v| !v.is_empty()) else {
            return Err(OAuth2Error::invalid_request("redirect_uri is required"));
        };

        let code_hash = crypto::hash_token(code);
        let stored = self
            .database
            .get_auth_code(&code_hash)
            .await
            .map_err(|err| self.internal("authorization code lookup", &err))?
            .ok_or_else(|| OAuth2Error::invalid_grant(BAD_CODE))?;

        let now = Utc::now();

        // A spent code presented again is a possible code-leak signal: kill
        // every live refresh token for the pair before rejecting
        if stored.used_at.is_some() {
            self.react_to_code_reuse(&stored, context).await;
            return Err(OAuth2Error::invalid_grant(BAD_CODE));
        }

        // Mismatches share one message with every other code failure so the
        // response never reveals which field was wrong
        if stored.client_id != client.client_id || stored.redirect_uri != redirect_uri {
            return Err(OAuth2Error::invalid_grant(BAD_CODE));
        }

        if stored.expires_at <= now {
            return Err(OAuth2Error::invalid_grant(BAD_CODE));
        }

        if let (Some(challenge), Some(method)) =
            (stored.code_challenge.as_deref(), stored.code_challenge_method.as_deref())
        {
            let Some(verifier) = request.code_verifier.as_deref().filter(|v| !v.is_empty())
            else {
                return Err(OAuth2Error::invalid_request("code_verifier is required"));
            };
            if !crypto::verify_code_challenge(verifier, challenge, method) {
                return Err(OAuth2Error::invalid_grant("PKCE verification failed"));
            }
        }

        // Exclusivity point: exactly one concurrent redemption wins
        let consumed = self
            .database
            .consume_auth_code(&code_hash, now)
            .await
            .map_err(|err| self.internal("consuming authorization code", &err))?;
        if !consumed {
            self.react_to_code_reuse(&stored, context).await;
            return Err(OAuth2Error::invalid_grant(BAD_CODE));
        }

        let user = self
            .database
            .get_user(stored.user_id)
            .await
            .map_err(|err| self.internal("user lookup", &err))?
            .ok_or_else(|| OAuth2Error::invalid_grant(BAD_CODE))?;

        let scopes = parse_scope(Some(&stored.scope));
        let response = self
            .issue_user_tokens(&user, client, &scopes, stored.nonce.as_deref(), context)
            .await?;

        audit::record(
            AuditEvent::TokenIssued,
            Some(user.id),
            Some(&client.client_id),
            context,
            "authorization_code",
        );

        Ok(response)
    }

    async fn refresh_token_grant(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        context: &AuditContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        const BAD_TOKEN: &str = "Refresh token is invalid, expired, or revoked";

        if !client.is_grant_type_allowed("refresh_token") {
            return Err(OAuth2Error::unauthorized_client(
                "Client is not allowed the refresh_token grant",
            ));
        }

        let Some(raw_token) = request.refresh_token.as_deref().filter(|v| !v.is_empty()) else {
            return Err(OAuth2Error::invalid_request("refresh_token is required"));
        };

        let stored = self
            .database
            .get_refresh_token(&crypto::hash_token(raw_token))
            .await
            .map_err(|err| self.internal("refresh token lookup", &err))?
            .ok_or_else(|| OAuth2Error::invalid_grant(BAD_TOKEN))?;

        let now = Utc::now();
        if stored.client_id != client.client_id || !stored.is_valid(now) {
            return Err(OAuth2Error::invalid_grant(BAD_TOKEN));
        }

        let user = self
            .database
            .get_user(stored.user_id)
            .await
            .map_err(|err| self.internal("user lookup", &err))?
            .ok_or_else(|| OAuth2Error::invalid_grant(BAD_TOKEN))?;

        // Rotation: old and new are never both valid
        let new_raw = crypto::generate_token(crypto::OPAQUE_TOKEN_BYTES);
        let new_row = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: crypto::hash_token(&new_raw),
            user_id: stored.user_id,
            client_id: stored.client_id.clone(),
            scope: stored.scope.clone(),
            user_agent: context.user_agent.clone(),
            ip_address: context.ip_address.clone(),
            expires_at: now + Duration::seconds(self.config.tokens.refresh_token_ttl_secs),
            revoked_at: None,
            created_at: now,
        };

        let rotated = self
            .database
            .rotate_refresh_token(stored.id, &new_row, now)
            .await
            .map_err(|err| self.internal("rotating refresh token", &err))?;
        if !rotated {
            return Err(OAuth2Error::invalid_grant(BAD_TOKEN));
        }

        let scopes = parse_scope(Some(&stored.scope));
        let mut response = self
            .issue_user_tokens_without_refresh(&user, client, &scopes, None)
            .await?;
        response.refresh_token = Some(new_raw);

        audit::record(
            AuditEvent::TokenRefreshed,
            Some(user.id),
            Some(&client.client_id),
            context,
            "",
        );

        Ok(response)
    }

    async fn client_credentials_grant(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        context: &AuditContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        if !client.is_confidential {
            return Err(OAuth2Error::unauthorized_client(
                "Only confidential clients may use client_credentials",
            ));
        }
        if !client.is_grant_type_allowed("client_credentials") {
            return Err(OAuth2Error::unauthorized_client(
                "Client is not allowed the client_credentials grant",
            ));
        }

        let scopes = parse_scope(request.scope.as_deref());
        if !client.are_scopes_allowed(&scopes) {
            return Err(OAuth2Error::invalid_scope(
                "Requested scope exceeds the client's allowed scopes",
            ));
        }

        let scope = scopes.join(" ");
        let access_token = self.sign_access_token(&client.client_id, &client.client_id, &scope)?;

        audit::record(
            AuditEvent::TokenIssued,
            None,
            Some(&client.client_id),
            context,
            "client_credentials",
        );

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.tokens.access_token_ttl_secs,
            refresh_token: None,
            id_token: None,
            scope,
        })
    }

    /// Issue access (+ ID, + refresh) tokens for a user-bound grant
    async fn issue_user_tokens(
        &self,
        user: &User,
        client: &OAuthClient,
        scopes: &[String],
        nonce: Option<&str>,
        context: &AuditContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        let mut response = self
            .issue_user_tokens_without_refresh(user, client, scopes, nonce)
            .await?;

        if scopes.iter().any(|s| s == "offline_access") {
            let now = Utc::now();
            let raw = crypto::generate_token(crypto::OPAQUE_TOKEN_BYTES);
            let row = RefreshToken {
                id: Uuid::new_v4(),
                token_hash: crypto::hash_token(&raw),
                user_id: user.id,
                client_id: client.client_id.clone(),
                scope: scopes.join(" "),
                user_agent: context.user_agent.clone(),
                ip_address: context.ip_address.clone(),
                expires_at: now + Duration::seconds(self.config.tokens.refresh_token_ttl_secs),
                revoked_at: None,
                created_at: now,
            };
            self.database
                .store_refresh_token(&row)
                .await
                .map_err(|err| self.internal("storing refresh token", &err))?;
            response.refresh_token = Some(raw);
        }

        Ok(response)
    }

    async fn issue_user_tokens_without_refresh(
        &self,
        user: &User,
        client: &OAuthClient,
        scopes: &[String],
        nonce: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let now = Utc::now().timestamp();
        let scope = scopes.join(" ");

        let access_token = self.sign_access_token(&user.id.to_string(), &client.client_id, &scope)?;

        let id_token = if scopes.iter().any(|s| s == "openid") {
            let at_hash = crypto::compute_at_hash(&access_token, self.keys.algorithm_name())
                .map_err(|err| self.internal("computing at_hash", &err))?;

            let wants_email = scopes.iter().any(|s| s == "email");
            let wants_profile = scopes.iter().any(|s| s == "profile");

            let claims = IdTokenClaims {
                sub: user.id.to_string(),
                iss: self.config.issuer_url.clone(),
                aud: client.client_id.clone(),
                exp: now + self.config.tokens.id_token_ttl_secs,
                iat: now,
                auth_time: user.last_login_at.map_or(now, |t| t.timestamp()),
                nonce: nonce.map(ToString::to_string),
                email: wants_email.then(|| user.email.clone()),
                email_verified: wants_email.then_some(user.email_verified),
                name: wants_profile.then(|| user.display_name.clone()).flatten(),
                at_hash: Some(at_hash),
            };
            Some(
                self.keys
                    .sign_id_token(&claims)
                    .map_err(|err| self.internal("signing ID token", &err))?,
            )
        } else {
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.tokens.access_token_ttl_secs,
            refresh_token: None,
            id_token,
            scope,
        })
    }

    fn sign_access_token(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
    ) -> Result<String, OAuth2Error> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iss: self.config.issuer_url.clone(),
            aud: client_id.to_string(),
            exp: now + self.config.tokens.access_token_ttl_secs,
            iat: now,
            scope: scope.to_string(),
            client_id: client_id.to_string(),
        };
        self.keys
            .sign_access_token(&claims)
            .map_err(|err| self.internal("signing access token", &err))
    }

    async fn react_to_code_reuse(&self, code: &AuthorizationCode, context: &AuditContext) {
        warn!(
            client_id = %code.client_id,
            user_id = %code.user_id,
            "Spent authorization code presented again; revoking refresh tokens for the pair"
        );
        match self
            .database
            .revoke_all_refresh_tokens(code.user_id, &code.client_id, Utc::now())
            .await
        {
            Ok(revoked) => {
                audit::record(
                    AuditEvent::CodeReuseDetected,
                    Some(code.user_id),
                    Some(&code.client_id),
                    context,
                    &format!("revoked {revoked} refresh tokens"),
                );
            }
            Err(err) => error!("Failed to revoke refresh tokens after code reuse: {err:#}"),
        }
    }

    /// Log the failure with full detail; the wire message is generic in
    /// production, detailed in development
    fn internal(&self, what: &str, err: &dyn std::fmt::Display) -> OAuth2Error {
        error!("Internal error while {what}: {err}");
        let app_error = if self.config.environment.is_production() {
            AppError::internal("Internal server error")
        } else {
            AppError::internal(format!("Internal error while {what}: {err}"))
        };
        OAuth2Error::from(&app_error)
    }
}

/// Split a space-delimited scope string, defaulting to `openid` when absent
#[must_use]
pub fn parse_scope(scope: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = scope
        .unwrap_or_default()
        .split_whitespace()
        .map(ToString::to_string)
        .collect();
    if parsed.is_empty() {
        vec!["openid".to_string()]
    } else {
        parsed
    }
}
