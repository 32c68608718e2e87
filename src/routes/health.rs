// ABOUTME: Health, readiness, and liveness probes
// ABOUTME: Readiness reflects store connectivity; liveness is unconditional
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! Health check routes

use crate::server::ServerResources;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Health check routes: /health, /ready, /live
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/live", get(handle_live))
        .with_state(resources)
}

async fn handle_health(State(resources): State<Arc<ServerResources>>) -> Response {
    let database_ok = probe_database(&resources).await;
    let status = if database_ok { "healthy" } else { "degraded" };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "checks": { "database": database_ok }
        })),
    )
        .into_response()
}

async fn handle_ready(State(resources): State<Arc<ServerResources>>) -> Response {
    if probe_database(&resources).await {
        Json(serde_json::json!({ "ready": true })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false })),
        )
            .into_response()
    }
}

async fn handle_live() -> Response {
    Json(serde_json::json!({ "alive": true })).into_response()
}

async fn probe_database(resources: &ServerResources) -> bool {
    sqlx::query("SELECT 1")
        .execute(resources.database.pool())
        .await
        .is_ok()
}
