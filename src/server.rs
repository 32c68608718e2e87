// ABOUTME: HTTP server assembly and the shared per-request context
// ABOUTME: Builds the router, layers tracing/CORS, and binds the listener
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Server Assembly
//!
//! [`ServerResources`] is the explicitly constructed, immutable context
//! shared into every handler; there is no ambient global state. Construction
//! is fail-fast: key loading happens before the listening socket is bound.

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::keys::KeyManager;
use crate::oauth2::endpoints::AuthorizationServer;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Immutable shared context for all request handlers
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Persistent store
    pub database: Arc<Database>,
    /// Signing keys and JWKS
    pub keys: Arc<KeyManager>,
    /// Authentication service
    pub auth: AuthService,
    /// The protocol orchestrator
    pub oauth2: AuthorizationServer,
}

impl ServerResources {
    /// Construct the full context from loaded configuration
    ///
    /// Key material is the one synchronous gate: failure here prevents the
    /// server from ever binding its socket.
    ///
    /// # Errors
    /// Returns an error if keys fail to load or the database is unreachable
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let config = Arc::new(config);

        let keys = Arc::new(
            KeyManager::from_config(&config).context("Failed to initialize signing keys")?,
        );
        info!(kid = keys.kid(), "Signing keys loaded");

        let database = Arc::new(
            Database::new(&config.database.url)
                .await
                .context("Failed to connect to database")?,
        );
        info!("Database connected and migrated");

        let auth = AuthService::new(Arc::clone(&database), &config.security);
        let oauth2 = AuthorizationServer::new(
            Arc::clone(&config),
            Arc::clone(&database),
            Arc::clone(&keys),
        );

        Ok(Self {
            config,
            database,
            keys,
            auth,
            oauth2,
        })
    }
}

/// Build the complete application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    // Discovery and JWKS are meant for cross-origin consumption
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    crate::oauth2::routes::routes(Arc::clone(&resources))
        .merge(crate::routes::health::routes(resources))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Bind the listener and serve until shutdown
///
/// # Errors
/// Returns an error if binding or serving fails
pub async fn serve(resources: Arc<ServerResources>) -> Result<()> {
    let port = resources.config.http_port;

    let database = Arc::clone(&resources.database);
    tokio::spawn(async move {
        expired_code_sweep(database).await;
    });

    let app = router(resources);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

/// Hourly deletion of authorization codes past their expiry
async fn expired_code_sweep(database: Arc<Database>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));

    loop {
        interval.tick().await;

        match database.delete_expired_auth_codes(chrono::Utc::now()).await {
            Ok(count) => {
                if count > 0 {
                    info!(count, "Deleted expired authorization codes");
                }
            }
            Err(e) => {
                error!("Expired authorization code sweep failed: {e}");
            }
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
