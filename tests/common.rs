// ABOUTME: Shared helpers for integration tests
// ABOUTME: In-memory database resources, seeded clients/users, and code issuance shortcuts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::Utc;
use keystone_sso::audit::AuditContext;
use keystone_sso::config::{
    DatabaseConfig, Environment, SecurityConfig, ServerConfig, TokenConfig,
};
use keystone_sso::crypto;
use keystone_sso::keys::RsaKeyPair;
use keystone_sso::models::{OAuthClient, User};
use keystone_sso::oauth2::models::AuthorizeParams;
use keystone_sso::server::ServerResources;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

pub const CLIENT_SECRET: &str = "integration-test-secret";
pub const USER_PASSWORD: &str = "correct-horse-battery";

/// RSA key generation is the slow part of resource setup; share one test key
/// across the process
pub fn test_signing_key() -> String {
    static TEST_KEY_PEM: OnceLock<String> = OnceLock::new();
    TEST_KEY_PEM
        .get_or_init(|| {
            let pair = RsaKeyPair::generate(2048).unwrap();
            pair.export_private_key_pem().unwrap().as_str().to_owned()
        })
        .clone()
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        issuer_url: "https://sso.test".to_string(),
        environment: Environment::Development,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        tokens: TokenConfig {
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
            id_token_ttl_secs: 3600,
            auth_code_ttl_secs: 600,
            algorithm: "RS256".to_string(),
            signing_key_pem: Some(test_signing_key()),
            public_key_pem: None,
        },
        security: SecurityConfig {
            bcrypt_cost: 4,
            max_login_attempts: 5,
            lockout_duration_secs: 900,
        },
    }
}

pub async fn create_resources() -> Arc<ServerResources> {
    create_resources_with(|_| {}).await
}

pub async fn create_resources_with(adjust: impl FnOnce(&mut ServerConfig)) -> Arc<ServerResources> {
    let mut config = test_config();
    adjust(&mut config);
    Arc::new(ServerResources::new(config).await.unwrap())
}

pub async fn seed_client(
    resources: &ServerResources,
    client_id: &str,
    is_confidential: bool,
    allowed_scopes: &[&str],
    allowed_grant_types: &[&str],
) -> OAuthClient {
    let client = OAuthClient {
        id: Uuid::new_v4(),
        client_id: client_id.to_string(),
        client_secret_hash: is_confidential.then(|| crypto::hash_token(CLIENT_SECRET)),
        name: format!("{client_id} (test)"),
        redirect_uris: vec!["https://app.test/callback".to_string()],
        allowed_scopes: allowed_scopes.iter().map(ToString::to_string).collect(),
        allowed_grant_types: allowed_grant_types.iter().map(ToString::to_string).collect(),
        is_confidential,
        created_at: Utc::now(),
    };
    resources.database.create_client(&client).await.unwrap();
    client
}

pub async fn seed_user(resources: &ServerResources, email: &str) -> User {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        email_verified: true,
        password_hash: crypto::hash_password(USER_PASSWORD, 4).unwrap(),
        display_name: Some("Test User".to_string()),
        failed_login_attempts: 0,
        locked_until: None,
        last_login_at: None,
        created_at: Utc::now(),
    };
    resources.database.create_user(&user).await.unwrap();
    user
}

pub fn authorize_params(client_id: &str, scope: &str) -> AuthorizeParams {
    AuthorizeParams {
        response_type: Some("code".to_string()),
        client_id: Some(client_id.to_string()),
        redirect_uri: Some("https://app.test/callback".to_string()),
        scope: Some(scope.to_string()),
        state: Some("xyz".to_string()),
        code_challenge: None,
        code_challenge_method: None,
        nonce: None,
    }
}

/// Run the authorize validation and mint a code for the given user, the way
/// a successful login submission would
pub async fn issue_code(
    resources: &ServerResources,
    params: &AuthorizeParams,
    user_id: Uuid,
) -> String {
    let authorize = resources
        .oauth2
        .validate_authorize(params)
        .await
        .unwrap_or_else(|rejection| panic!("authorize rejected: {rejection:?}"));
    resources
        .oauth2
        .issue_authorization_code(&authorize, user_id, &AuditContext::default())
        .await
        .unwrap()
}
