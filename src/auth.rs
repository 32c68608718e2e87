// ABOUTME: User authentication with failed-attempt tracking and account lockout
// ABOUTME: Every denial reason audits precisely but surfaces one generic message
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Authentication Service
//!
//! Implements the login-attempt state machine: lowercased email lookup,
//! lockout check before any password work, counter increment with lockout at
//! the configured threshold, and counter reset on success. Callers must never
//! distinguish denial reasons in anything user-visible; the audit log carries
//! the precise cause.

use crate::audit::{self, AuditContext, AuditEvent};
use crate::config::SecurityConfig;
use crate::crypto;
use crate::database::Database;
use crate::models::User;
use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Why an authentication attempt was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// No user with that email
    UserNotFound,
    /// Password did not match
    InvalidCredentials,
    /// Account is locked out
    AccountLocked,
}

/// Outcome of an authentication attempt
#[derive(Debug)]
pub enum AuthDecision {
    /// Credentials verified; the user record is returned for token issuance.
    /// The embedded password hash must not cross the orchestrator boundary.
    Authenticated(User),
    /// Attempt denied; reason is for auditing only
    Denied(DenialReason),
}

/// Authentication service with lockout enforcement
pub struct AuthService {
    database: Arc<Database>,
    max_login_attempts: i64,
    lockout_duration: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    /// Create the service from security configuration
    #[must_use]
    pub fn new(database: Arc<Database>, security: &SecurityConfig) -> Self {
        Self {
            database,
            max_login_attempts: security.max_login_attempts,
            lockout_duration: Duration::seconds(security.lockout_duration_secs),
            bcrypt_cost: security.bcrypt_cost,
        }
    }

    /// Configured bcrypt cost (used by registration/seed paths)
    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    /// Authenticate a user by email and password
    ///
    /// # Errors
    /// Returns an error only on storage or hashing failure; a rejected
    /// attempt is an `Ok(AuthDecision::Denied(_))`
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        context: &AuditContext,
    ) -> Result<AuthDecision> {
        let Some(user) = self.database.get_user_by_email(email).await? else {
            audit::record(AuditEvent::LoginFailure, None, None, context, "user not found");
            return Ok(AuthDecision::Denied(DenialReason::UserNotFound));
        };

        let now = Utc::now();

        // Locked accounts never reach password verification
        if let Some(locked_until) = user.locked_until {
            if locked_until > now {
                audit::record(
                    AuditEvent::AccountLocked,
                    Some(user.id),
                    None,
                    context,
                    "attempt while locked",
                );
                return Ok(AuthDecision::Denied(DenialReason::AccountLocked));
            }
        }

        let password_matches = {
            let password = password.to_string();
            let hash = user.password_hash.clone();
            tokio::task::spawn_blocking(move || crypto::verify_password(&password, &hash))
                .await
                .map_err(|e| anyhow!("Password verification task failed: {e}"))??
        };

        if !password_matches {
            let attempts = user.failed_login_attempts + 1;
            let locked_until = (attempts >= self.max_login_attempts)
                .then(|| now + self.lockout_duration);

            self.database
                .record_failed_login(user.id, attempts, locked_until)
                .await?;

            if locked_until.is_some() {
                audit::record(
                    AuditEvent::AccountLocked,
                    Some(user.id),
                    None,
                    context,
                    "failed-attempt threshold reached",
                );
            } else {
                audit::record(
                    AuditEvent::LoginFailure,
                    Some(user.id),
                    None,
                    context,
                    "wrong password",
                );
            }
            return Ok(AuthDecision::Denied(DenialReason::InvalidCredentials));
        }

        self.database.record_successful_login(user.id, now).await?;
        audit::record(AuditEvent::LoginSuccess, Some(user.id), None, context, "");
        debug!(user_id = %user.id, "User authenticated");

        // Return the post-login view of the row
        let user = User {
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: Some(now),
            ..user
        };

        Ok(AuthDecision::Authenticated(user))
    }
}
