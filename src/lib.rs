// ABOUTME: Library root for the Keystone SSO authorization server
// ABOUTME: Wires configuration, crypto, storage, and the OAuth2/OIDC protocol modules
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Keystone SSO
//!
//! OAuth 2.0 / OpenID Connect authorization server for a small set of
//! first-party client applications. Issues and validates access, ID, and
//! refresh tokens: authorization-code grants with PKCE, exactly-once code
//! redemption, refresh-token rotation with reuse detection, RS256 signing
//! with JWKS publication, and login-attempt lockout.

#![deny(unsafe_code)]

/// Structured audit events for security-relevant actions
pub mod audit;
/// User authentication with failed-attempt lockout
pub mod auth;
/// Environment-based server configuration
pub mod config;
/// Password hashing, opaque tokens, PKCE, and `at_hash` primitives
pub mod crypto;
/// Persistent storage for users, clients, codes, and refresh tokens
pub mod database;
/// Unified error types and HTTP status mapping
pub mod errors;
/// RSA key management, JWT signing/verification, JWKS publication
pub mod keys;
/// Logging and tracing configuration
pub mod logging;
/// Domain models and JWT claim types
pub mod models;
/// OAuth 2.0 / OIDC protocol implementation
pub mod oauth2;
/// HTTP route handlers outside the OAuth2 surface
pub mod routes;
/// HTTP server assembly and shared request context
pub mod server;
