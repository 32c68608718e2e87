// ABOUTME: Storage-layer tests against a file-backed SQLite database
// ABOUTME: Covers persistence across reopen, code consumption, and bulk revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::{Duration, Utc};
use keystone_sso::crypto;
use keystone_sso::database::Database;
use keystone_sso::models::{AuthorizationCode, RefreshToken, User};
use uuid::Uuid;

fn sample_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        email_verified: false,
        password_hash: crypto::hash_password("password", 4).unwrap(),
        display_name: None,
        failed_login_attempts: 0,
        locked_until: None,
        last_login_at: None,
        created_at: Utc::now(),
    }
}

fn sample_refresh_token(user_id: Uuid, client_id: &str) -> RefreshToken {
    let now = Utc::now();
    RefreshToken {
        id: Uuid::new_v4(),
        token_hash: crypto::hash_token(&crypto::generate_token(32)),
        user_id,
        client_id: client_id.to_string(),
        scope: "openid".to_string(),
        user_agent: None,
        ip_address: None,
        expires_at: now + Duration::days(7),
        revoked_at: None,
        created_at: now,
    }
}

#[tokio::test]
async fn data_survives_a_database_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sso.db");
    let url = format!("sqlite:{}", path.display());

    let user = sample_user("persist@example.com");
    {
        let database = Database::new(&url).await.unwrap();
        database.migrate().await.unwrap();
        database.create_user(&user).await.unwrap();
    }

    let database = Database::new(&url).await.unwrap();
    database.migrate().await.unwrap();
    let loaded = database
        .get_user_by_email("persist@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.id, user.id);
    assert_eq!(loaded.password_hash, user.password_hash);
}

#[tokio::test]
async fn auth_code_consumption_is_exactly_once() {
    let database = Database::new("sqlite::memory:").await.unwrap();
    database.migrate().await.unwrap();

    let now = Utc::now();
    let code = AuthorizationCode {
        code_hash: crypto::hash_token("raw-code"),
        client_id: "web-app".to_string(),
        user_id: Uuid::new_v4(),
        redirect_uri: "https://app.test/callback".to_string(),
        scope: "openid".to_string(),
        code_challenge: None,
        code_challenge_method: None,
        nonce: None,
        expires_at: now + Duration::minutes(10),
        used_at: None,
        created_at: now,
    };
    database.store_auth_code(&code).await.unwrap();

    assert!(database.consume_auth_code(&code.code_hash, now).await.unwrap());
    assert!(!database.consume_auth_code(&code.code_hash, now).await.unwrap());

    let stored = database.get_auth_code(&code.code_hash).await.unwrap().unwrap();
    assert!(stored.used_at.is_some());
}

#[tokio::test]
async fn revoke_all_only_touches_the_given_pair() {
    let database = Database::new("sqlite::memory:").await.unwrap();
    database.migrate().await.unwrap();

    let user_a = Uuid::new_v4();
    let user_b = Uuid::new_v4();
    let token_a1 = sample_refresh_token(user_a, "web-app");
    let token_a2 = sample_refresh_token(user_a, "web-app");
    let token_a_other = sample_refresh_token(user_a, "other-app");
    let token_b = sample_refresh_token(user_b, "web-app");
    for token in [&token_a1, &token_a2, &token_a_other, &token_b] {
        database.store_refresh_token(token).await.unwrap();
    }

    let revoked = database
        .revoke_all_refresh_tokens(user_a, "web-app", Utc::now())
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    let untouched = database
        .get_refresh_token(&token_a_other.token_hash)
        .await
        .unwrap()
        .unwrap();
    assert!(untouched.revoked_at.is_none());
    let untouched = database.get_refresh_token(&token_b.token_hash).await.unwrap().unwrap();
    assert!(untouched.revoked_at.is_none());
}

#[tokio::test]
async fn expired_code_cleanup_removes_only_expired_rows() {
    let database = Database::new("sqlite::memory:").await.unwrap();
    database.migrate().await.unwrap();

    let now = Utc::now();
    for (name, offset) in [("old", -10), ("fresh", 10)] {
        let code = AuthorizationCode {
            code_hash: crypto::hash_token(name),
            client_id: "web-app".to_string(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://app.test/callback".to_string(),
            scope: "openid".to_string(),
            code_challenge: None,
            code_challenge_method: None,
            nonce: None,
            expires_at: now + Duration::minutes(offset),
            used_at: None,
            created_at: now,
        };
        database.store_auth_code(&code).await.unwrap();
    }

    let deleted = database.delete_expired_auth_codes(now).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(database
        .get_auth_code(&crypto::hash_token("old"))
        .await
        .unwrap()
        .is_none());
    assert!(database
        .get_auth_code(&crypto::hash_token("fresh"))
        .await
        .unwrap()
        .is_some());
}
