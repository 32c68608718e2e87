// ABOUTME: Structured audit events for security-relevant actions
// ABOUTME: Emitted through the tracing pipeline under target "audit"
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Audit Events
//!
//! Consumed by, not part of, the core protocol logic: orchestrator and auth
//! code call [`record`] at each security-relevant branch. Events flow through
//! the normal tracing subscriber under `target: "audit"` so a JSON log sink
//! can filter them out for retention.

use serde::Serialize;
use uuid::Uuid;

/// Security-relevant event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful user authentication
    LoginSuccess,
    /// Failed user authentication (unknown user or wrong password)
    LoginFailure,
    /// Account locked after reaching the failed-attempt threshold
    AccountLocked,
    /// Tokens issued via authorization_code or client_credentials
    TokenIssued,
    /// Tokens re-issued via refresh_token rotation
    TokenRefreshed,
    /// Refresh token revoked via /oauth/revoke
    TokenRevoked,
    /// Authorization code issued after successful login
    AuthorizationGranted,
    /// Authorize request rejected after validation
    AuthorizationDenied,
    /// A spent authorization code was presented again
    CodeReuseDetected,
}

impl AuditEvent {
    /// Wire/log name of the event
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::AccountLocked => "account_locked",
            Self::TokenIssued => "token_issued",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenRevoked => "token_revoked",
            Self::AuthorizationGranted => "authorization_granted",
            Self::AuthorizationDenied => "authorization_denied",
            Self::CodeReuseDetected => "code_reuse_detected",
        }
    }
}

/// Request context attached to audit events
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    /// Client IP, when known
    pub ip_address: Option<String>,
    /// User agent, when known
    pub user_agent: Option<String>,
}

/// Record an audit event with whatever identity context is available
pub fn record(
    event: AuditEvent,
    user_id: Option<Uuid>,
    client_id: Option<&str>,
    context: &AuditContext,
    detail: &str,
) {
    tracing::info!(
        target: "audit",
        event = event.as_str(),
        user_id = user_id.map(|id| id.to_string()),
        client_id,
        ip_address = context.ip_address.as_deref(),
        user_agent = context.user_agent.as_deref(),
        detail,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(AuditEvent::LoginSuccess.as_str(), "login_success");
        assert_eq!(AuditEvent::CodeReuseDetected.as_str(), "code_reuse_detected");
        assert_eq!(
            serde_json::to_value(AuditEvent::AccountLocked).unwrap(),
            serde_json::json!("account_locked")
        );
    }
}
