// ABOUTME: Environment-based server configuration
// ABOUTME: Single from_env entry point with explicit defaults and fail-fast parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Server Configuration
//!
//! All configuration comes from environment variables with explicit defaults.
//! Parsing failures are fatal at startup; there is no per-request config
//! fallback. The loaded [`ServerConfig`] is immutable for the process
//! lifetime and shared by reference into every handler.

use anyhow::{Context, Result};
use std::env;
use tracing::info;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development: generated keys allowed, full error detail
    Development,
    /// Production: PEM key material required, error detail suppressed
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// Whether this is a production deployment
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
}

/// Token lifetime and signing configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access token TTL in seconds; `expires_in` in every token response
    pub access_token_ttl_secs: i64,
    /// Refresh token TTL in seconds
    pub refresh_token_ttl_secs: i64,
    /// ID token TTL in seconds
    pub id_token_ttl_secs: i64,
    /// Authorization code TTL in seconds
    pub auth_code_ttl_secs: i64,
    /// JWT signing algorithm (RS256)
    pub algorithm: String,
    /// PEM-encoded RSA private key; generated at startup in development when absent
    pub signing_key_pem: Option<String>,
    /// PEM-encoded RSA public key; when present it must match the signing key
    pub public_key_pem: Option<String>,
}

/// Login-attempt and password hashing configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// bcrypt cost factor
    pub bcrypt_cost: u32,
    /// Consecutive failed logins before lockout
    pub max_login_attempts: i64,
    /// Lockout window in seconds
    pub lockout_duration_secs: i64,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Issuer URL baked into every token (`iss`) and the discovery document
    pub issuer_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Token configuration
    pub tokens: TokenConfig,
    /// Security settings
    pub security: SecurityConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if any recognized variable fails to parse
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let http_port = env_var_or("HTTP_PORT", "8080")
            .parse()
            .context("Invalid HTTP_PORT value")?;

        let config = Self {
            http_port,
            issuer_url: env_var_or("ISSUER_URL", &format!("http://localhost:{http_port}")),
            environment: Environment::from_env(),
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:./data/keystone.db"),
            },
            tokens: TokenConfig {
                access_token_ttl_secs: env_var_or("JWT_ACCESS_TOKEN_TTL", "900")
                    .parse()
                    .context("Invalid JWT_ACCESS_TOKEN_TTL value")?,
                refresh_token_ttl_secs: env_var_or("JWT_REFRESH_TOKEN_TTL", "604800")
                    .parse()
                    .context("Invalid JWT_REFRESH_TOKEN_TTL value")?,
                id_token_ttl_secs: env_var_or("JWT_ID_TOKEN_TTL", "3600")
                    .parse()
                    .context("Invalid JWT_ID_TOKEN_TTL value")?,
                auth_code_ttl_secs: env_var_or("AUTH_CODE_TTL", "600")
                    .parse()
                    .context("Invalid AUTH_CODE_TTL value")?,
                algorithm: env_var_or("JWT_ALGORITHM", "RS256"),
                signing_key_pem: env::var("JWT_SIGNING_KEY").ok(),
                public_key_pem: env::var("JWT_PUBLIC_KEY").ok(),
            },
            security: SecurityConfig {
                bcrypt_cost: env_var_or("BCRYPT_ROUNDS", "12")
                    .parse()
                    .context("Invalid BCRYPT_ROUNDS value")?,
                max_login_attempts: env_var_or("MAX_LOGIN_ATTEMPTS", "5")
                    .parse()
                    .context("Invalid MAX_LOGIN_ATTEMPTS value")?,
                lockout_duration_secs: env_var_or("LOCKOUT_DURATION", "900")
                    .parse()
                    .context("Invalid LOCKOUT_DURATION value")?,
            },
        };

        info!(
            issuer = %config.issuer_url,
            port = config.http_port,
            environment = ?config.environment,
            "Configuration loaded"
        );

        Ok(config)
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
