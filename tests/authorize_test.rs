// ABOUTME: Authorize endpoint validation tests
// ABOUTME: Verifies fatal-versus-redirect error reporting and exact redirect matching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{authorize_params, create_resources, seed_client};
use keystone_sso::oauth2::endpoints::AuthorizeRejection;

const SCOPES: &[&str] = &["openid", "profile"];
const GRANTS: &[&str] = &["authorization_code"];

#[tokio::test]
async fn missing_client_id_is_fatal() {
    let resources = create_resources().await;
    let mut params = authorize_params("web-app", "openid");
    params.client_id = None;

    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    let AuthorizeRejection::Fatal(error) = rejection else {
        panic!("expected a fatal rejection");
    };
    assert_eq!(error.error, "invalid_request");
}

#[tokio::test]
async fn unknown_client_is_fatal() {
    let resources = create_resources().await;
    let params = authorize_params("no-such-client", "openid");

    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    assert!(matches!(rejection, AuthorizeRejection::Fatal(_)));
}

#[tokio::test]
async fn unregistered_redirect_uri_is_fatal_not_redirected() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, SCOPES, GRANTS).await;

    // Exact matching: trailing slash, scheme, and path prefix all differ
    for redirect_uri in [
        "https://app.test/callback/",
        "http://app.test/callback",
        "https://app.test/callback/extra",
        "https://evil.test/callback",
    ] {
        let mut params = authorize_params("web-app", "openid");
        params.redirect_uri = Some(redirect_uri.to_string());
        let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
        assert!(
            matches!(rejection, AuthorizeRejection::Fatal(_)),
            "{redirect_uri} must never be redirected to"
        );
    }
}

#[tokio::test]
async fn unsupported_response_type_is_fatal() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, SCOPES, GRANTS).await;

    let mut params = authorize_params("web-app", "openid");
    params.response_type = Some("token".to_string());
    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    let AuthorizeRejection::Fatal(error) = rejection else {
        panic!("expected a fatal rejection");
    };
    assert_eq!(error.error, "unsupported_response_type");
}

#[tokio::test]
async fn excess_scope_redirects_with_invalid_scope() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, SCOPES, GRANTS).await;

    let params = authorize_params("web-app", "openid admin");
    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    let AuthorizeRejection::Redirect {
        redirect_uri,
        state,
        error,
    } = rejection
    else {
        panic!("expected a redirect rejection");
    };
    assert_eq!(redirect_uri, "https://app.test/callback");
    assert_eq!(state.as_deref(), Some("xyz"));
    assert_eq!(error.error, "invalid_scope");
}

#[tokio::test]
async fn disallowed_grant_type_redirects_with_unauthorized_client() {
    let resources = create_resources().await;
    seed_client(&resources, "machine", true, SCOPES, &["client_credentials"]).await;

    let params = authorize_params("machine", "openid");
    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    let AuthorizeRejection::Redirect { error, .. } = rejection else {
        panic!("expected a redirect rejection");
    };
    assert_eq!(error.error, "unauthorized_client");
}

#[tokio::test]
async fn bad_challenge_method_redirects_with_invalid_request() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, SCOPES, GRANTS).await;

    let mut params = authorize_params("web-app", "openid");
    params.code_challenge = Some("abc".to_string());
    params.code_challenge_method = Some("S512".to_string());
    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    let AuthorizeRejection::Redirect { error, .. } = rejection else {
        panic!("expected a redirect rejection");
    };
    assert_eq!(error.error, "invalid_request");

    // Method missing entirely is the same failure class
    let mut params = authorize_params("web-app", "openid");
    params.code_challenge = Some("abc".to_string());
    params.code_challenge_method = None;
    let rejection = resources.oauth2.validate_authorize(&params).await.unwrap_err();
    assert!(matches!(rejection, AuthorizeRejection::Redirect { .. }));
}

#[tokio::test]
async fn absent_scope_defaults_to_openid() {
    let resources = create_resources().await;
    seed_client(&resources, "web-app", true, SCOPES, GRANTS).await;

    let mut params = authorize_params("web-app", "openid");
    params.scope = None;
    let validated = resources.oauth2.validate_authorize(&params).await.unwrap();
    assert_eq!(validated.scopes, vec!["openid".to_string()]);
}
