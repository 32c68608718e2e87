// ABOUTME: OAuth 2.0 / OIDC protocol implementation
// ABOUTME: Wire models, the authorization/token orchestrator, and the axum route surface
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # OAuth 2.0 Authorization Server
//!
//! RFC 6749 authorization-code (with PKCE, RFC 7636), refresh-token, and
//! client-credentials grants, plus RFC 7009 revocation and the OIDC
//! discovery/JWKS surface.

/// Orchestrator: the protocol state machine
pub mod endpoints;
/// Request/response wire types and RFC 6749 error objects
pub mod models;
/// HTTP handlers and router
pub mod routes;
