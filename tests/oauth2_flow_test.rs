// ABOUTME: End-to-end OAuth 2.0 flow tests against an in-memory database
// ABOUTME: Covers code redemption, PKCE, rotation, client auth, and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    authorize_params, create_resources, create_resources_with, issue_code, seed_client, seed_user,
    CLIENT_SECRET,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use keystone_sso::audit::AuditContext;
use keystone_sso::crypto;
use keystone_sso::models::IdTokenClaims;
use keystone_sso::oauth2::endpoints::ClientCredentials;
use keystone_sso::oauth2::models::TokenRequest;

const ALL_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];
const USER_GRANTS: &[&str] = &["authorization_code", "refresh_token"];

fn confidential_credentials(client_id: &str) -> ClientCredentials {
    ClientCredentials {
        client_id: Some(client_id.to_string()),
        client_secret: Some(CLIENT_SECRET.to_string()),
    }
}

fn code_request(code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: Some("authorization_code".to_string()),
        code: Some(code.to_string()),
        redirect_uri: Some("https://app.test/callback".to_string()),
        client_id: None,
        client_secret: None,
        code_verifier: None,
        refresh_token: None,
        scope: None,
    }
}

fn refresh_request(refresh_token: &str) -> TokenRequest {
    TokenRequest {
        grant_type: Some("refresh_token".to_string()),
        code: None,
        redirect_uri: None,
        client_id: None,
        client_secret: None,
        code_verifier: None,
        refresh_token: Some(refresh_token.to_string()),
        scope: None,
    }
}

/// Decode and fully verify an ID token against the published JWKS
fn decode_id_token(
    resources: &keystone_sso::server::ServerResources,
    id_token: &str,
    audience: &str,
) -> IdTokenClaims {
    let jwks = resources.keys.jwks();
    let jwk = &jwks.keys[0];
    let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[&resources.config.issuer_url]);
    jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
        .unwrap()
        .claims
}

#[tokio::test]
async fn authorization_code_flow_issues_full_token_set() {
    let resources = create_resources().await;
    let client = seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "alice@example.com").await;

    let mut params = authorize_params("web-app", "openid profile email offline_access");
    params.nonce = Some("nonce-123".to_string());
    let code = issue_code(&resources, &params, user.id).await;

    let response = resources
        .oauth2
        .token(
            &confidential_credentials("web-app"),
            &code_request(&code),
            &AuditContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 900);
    assert_eq!(response.scope, "openid profile email offline_access");
    assert!(response.refresh_token.is_some(), "offline_access grants a refresh token");

    let claims = resources
        .keys
        .verify_access_token(&response.access_token, &client.client_id)
        .unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.iss, resources.config.issuer_url);
    assert_eq!(claims.client_id, "web-app");
    assert_eq!(claims.exp - claims.iat, 900);

    let id_token = response.id_token.expect("openid grants an ID token");
    let id_claims = decode_id_token(&resources, &id_token, &client.client_id);
    assert_eq!(id_claims.sub, user.id.to_string());
    assert_eq!(id_claims.nonce.as_deref(), Some("nonce-123"));
    assert_eq!(id_claims.email.as_deref(), Some("alice@example.com"));
    assert_eq!(id_claims.email_verified, Some(true));
    assert_eq!(id_claims.name.as_deref(), Some("Test User"));

    let expected_at_hash = crypto::compute_at_hash(&response.access_token, "RS256").unwrap();
    assert_eq!(id_claims.at_hash.as_deref(), Some(expected_at_hash.as_str()));
}

#[tokio::test]
async fn code_reuse_is_rejected_and_revokes_refresh_tokens() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "bob@example.com").await;

    let params = authorize_params("web-app", "openid offline_access");
    let code = issue_code(&resources, &params, user.id).await;
    let credentials = confidential_credentials("web-app");
    let context = AuditContext::default();

    let first = resources
        .oauth2
        .token(&credentials, &code_request(&code), &context)
        .await
        .unwrap();
    let refresh_token = first.refresh_token.unwrap();

    let second = resources
        .oauth2
        .token(&credentials, &code_request(&code), &context)
        .await
        .unwrap_err();
    assert_eq!(second.error, "invalid_grant");

    // Reuse kills the refresh token minted by the first redemption
    let refresh = resources
        .oauth2
        .token(&credentials, &refresh_request(&refresh_token), &context)
        .await
        .unwrap_err();
    assert_eq!(refresh.error, "invalid_grant");
}

#[tokio::test]
async fn concurrent_redemptions_of_one_code_yield_exactly_one_token_set() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "race@example.com").await;

    let params = authorize_params("web-app", "openid");
    let code = issue_code(&resources, &params, user.id).await;
    let credentials = confidential_credentials("web-app");
    let context = AuditContext::default();

    let request_a = code_request(&code);
    let request_b = code_request(&code);
    let (first, second) = tokio::join!(
        resources.oauth2.token(&credentials, &request_a, &context),
        resources.oauth2.token(&credentials, &request_b, &context),
    );

    let winners = [&first, &second]
        .iter()
        .filter(|outcome| outcome.is_ok())
        .count();
    assert_eq!(winners, 1, "exactly one redemption may succeed");

    let loser = if first.is_err() { first } else { second };
    assert_eq!(loser.unwrap_err().error, "invalid_grant");
}

#[tokio::test]
async fn code_is_bound_to_the_issuing_client() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    seed_client(&resources, "other-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "carol@example.com").await;

    let code = issue_code(&resources, &authorize_params("web-app", "openid"), user.id).await;

    let err = resources
        .oauth2
        .token(
            &confidential_credentials("other-app"),
            &code_request(&code),
            &AuditContext::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn code_redirect_uri_must_match_issuance() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "dave@example.com").await;

    let code = issue_code(&resources, &authorize_params("web-app", "openid"), user.id).await;

    let mut request = code_request(&code);
    request.redirect_uri = Some("https://app.test/other".to_string());
    let err = resources
        .oauth2
        .token(
            &confidential_credentials("web-app"),
            &request,
            &AuditContext::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let resources = create_resources_with(|config| {
        config.tokens.auth_code_ttl_secs = 0;
    })
    .await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "erin@example.com").await;

    let code = issue_code(&resources, &authorize_params("web-app", "openid"), user.id).await;

    let err = resources
        .oauth2
        .token(
            &confidential_credentials("web-app"),
            &code_request(&code),
            &AuditContext::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn pkce_verifier_is_required_and_checked() {
    let resources = create_resources().await;
    seed_client(&resources, "spa", false, &["openid"], &["authorization_code"]).await;
    let user = seed_user(&resources, "frank@example.com").await;

    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let mut params = authorize_params("spa", "openid");
    params.code_challenge = Some(crypto::compute_s256_challenge(verifier));
    params.code_challenge_method = Some("S256".to_string());
    let code = issue_code(&resources, &params, user.id).await;

    let public = ClientCredentials {
        client_id: Some("spa".to_string()),
        client_secret: None,
    };
    let context = AuditContext::default();

    let missing = resources
        .oauth2
        .token(&public, &code_request(&code), &context)
        .await
        .unwrap_err();
    assert_eq!(missing.error, "invalid_request");

    let mut wrong = code_request(&code);
    wrong.code_verifier = Some("not-the-right-verifier-but-long-enough00000".to_string());
    let rejected = resources.oauth2.token(&public, &wrong, &context).await.unwrap_err();
    assert_eq!(rejected.error, "invalid_grant");

    // Failed PKCE attempts do not consume the code
    let mut right = code_request(&code);
    right.code_verifier = Some(verifier.to_string());
    let response = resources.oauth2.token(&public, &right, &context).await.unwrap();
    assert!(response.id_token.is_some());
    assert!(response.refresh_token.is_none(), "no offline_access, no refresh token");
}

#[tokio::test]
async fn refresh_rotation_invalidates_the_predecessor() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "grace@example.com").await;

    let code = issue_code(
        &resources,
        &authorize_params("web-app", "openid offline_access"),
        user.id,
    )
    .await;
    let credentials = confidential_credentials("web-app");
    let context = AuditContext::default();

    let initial = resources
        .oauth2
        .token(&credentials, &code_request(&code), &context)
        .await
        .unwrap();
    let old_token = initial.refresh_token.unwrap();

    let rotated = resources
        .oauth2
        .token(&credentials, &refresh_request(&old_token), &context)
        .await
        .unwrap();
    let new_token = rotated.refresh_token.clone().unwrap();
    assert_ne!(new_token, old_token);
    assert_eq!(rotated.scope, "openid offline_access");

    let replay = resources
        .oauth2
        .token(&credentials, &refresh_request(&old_token), &context)
        .await
        .unwrap_err();
    assert_eq!(replay.error, "invalid_grant");

    // The successor still works
    resources
        .oauth2
        .token(&credentials, &refresh_request(&new_token), &context)
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_token_is_bound_to_the_issuing_client() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    seed_client(&resources, "other-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "heidi@example.com").await;

    let code = issue_code(
        &resources,
        &authorize_params("web-app", "openid offline_access"),
        user.id,
    )
    .await;
    let context = AuditContext::default();
    let initial = resources
        .oauth2
        .token(
            &confidential_credentials("web-app"),
            &code_request(&code),
            &context,
        )
        .await
        .unwrap();
    let refresh_token = initial.refresh_token.unwrap();

    let err = resources
        .oauth2
        .token(
            &confidential_credentials("other-app"),
            &refresh_request(&refresh_token),
            &context,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn client_credentials_grant_enforces_scope_policy() {
    let resources = create_resources().await;
    seed_client(
        &resources,
        "service",
        true,
        &["api:read"],
        &["client_credentials"],
    )
    .await;
    let credentials = confidential_credentials("service");
    let context = AuditContext::default();

    let mut request = TokenRequest {
        grant_type: Some("client_credentials".to_string()),
        code: None,
        redirect_uri: None,
        client_id: None,
        client_secret: None,
        code_verifier: None,
        refresh_token: None,
        scope: Some("api:read".to_string()),
    };

    let response = resources
        .oauth2
        .token(&credentials, &request, &context)
        .await
        .unwrap();
    assert!(response.refresh_token.is_none());
    assert!(response.id_token.is_none());
    let claims = resources
        .keys
        .verify_access_token(&response.access_token, "service")
        .unwrap();
    assert_eq!(claims.sub, "service", "machine tokens act as the client itself");

    request.scope = Some("api:read api:write".to_string());
    let err = resources
        .oauth2
        .token(&credentials, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_scope");
}

#[tokio::test]
async fn client_authentication_failures() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    seed_client(&resources, "spa", false, &["openid"], &["authorization_code"]).await;
    let context = AuditContext::default();
    let request = refresh_request("irrelevant");

    let wrong_secret = ClientCredentials {
        client_id: Some("web-app".to_string()),
        client_secret: Some("wrong-secret".to_string()),
    };
    let err = resources
        .oauth2
        .token(&wrong_secret, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");
    assert_eq!(err.http_status(), 401);

    let missing_secret = ClientCredentials {
        client_id: Some("web-app".to_string()),
        client_secret: None,
    };
    let err = resources
        .oauth2
        .token(&missing_secret, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");

    let unknown = ClientCredentials {
        client_id: Some("no-such-client".to_string()),
        client_secret: Some("anything".to_string()),
    };
    let err = resources
        .oauth2
        .token(&unknown, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // A public client presenting a secret is a misconfigured caller
    let public_with_secret = ClientCredentials {
        client_id: Some("spa".to_string()),
        client_secret: Some("should-not-be-here".to_string()),
    };
    let err = resources
        .oauth2
        .token(&public_with_secret, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_request");
}

#[tokio::test]
async fn unknown_grant_types_are_rejected() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let credentials = confidential_credentials("web-app");
    let context = AuditContext::default();

    let mut request = refresh_request("irrelevant");
    request.grant_type = Some("password".to_string());
    let err = resources
        .oauth2
        .token(&credentials, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "unsupported_grant_type");

    request.grant_type = None;
    let err = resources
        .oauth2
        .token(&credentials, &request, &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_request");
}

#[tokio::test]
async fn revocation_is_silent_and_effective() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, ALL_SCOPES, USER_GRANTS).await;
    let user = seed_user(&resources, "ivan@example.com").await;
    let context = AuditContext::default();
    let credentials = confidential_credentials("web-app");

    let code = issue_code(
        &resources,
        &authorize_params("web-app", "openid offline_access"),
        user.id,
    )
    .await;
    let response = resources
        .oauth2
        .token(&credentials, &code_request(&code), &context)
        .await
        .unwrap();
    let refresh_token = response.refresh_token.unwrap();

    // Unknown tokens revoke without complaint
    resources.oauth2.revoke("not-a-real-token", &context).await;

    resources.oauth2.revoke(&refresh_token, &context).await;
    let err = resources
        .oauth2
        .token(&credentials, &refresh_request(&refresh_token), &context)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}
