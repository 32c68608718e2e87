// ABOUTME: HTTP route handlers outside the OAuth2 protocol surface
// ABOUTME: Currently just the health/readiness probes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! Non-protocol HTTP routes

/// Liveness and readiness probes
pub mod health;
