// ABOUTME: Main server binary: load config, init logging and keys, bind and serve
// ABOUTME: Optional --seed-demo inserts a development client and user before starting
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! Keystone SSO server binary

#![allow(clippy::print_stdout)]

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use keystone_sso::config::ServerConfig;
use keystone_sso::crypto;
use keystone_sso::logging;
use keystone_sso::models::{OAuthClient, User};
use keystone_sso::server::{self, ServerResources};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "keystone-sso")]
#[command(about = "OAuth 2.0 / OpenID Connect authorization server")]
#[command(version)]
struct Args {
    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Insert a demo client and user for local development, then start
    #[arg(long)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database.url = database_url;
    }

    logging::init_from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Keystone SSO server"
    );

    let bcrypt_cost = config.security.bcrypt_cost;
    let resources = Arc::new(ServerResources::new(config).await?);

    if args.seed_demo {
        seed_demo_data(&resources, bcrypt_cost).await?;
    }

    server::serve(resources).await
}

/// Insert the development client and user when absent
async fn seed_demo_data(resources: &ServerResources, bcrypt_cost: u32) -> Result<()> {
    const DEMO_CLIENT_ID: &str = "bible-dev";
    const DEMO_CLIENT_SECRET: &str = "dev-client-secret";
    const DEMO_EMAIL: &str = "demo@example.com";
    const DEMO_PASSWORD: &str = "demo-password";

    let now = Utc::now();

    if resources.database.get_client(DEMO_CLIENT_ID).await?.is_none() {
        let client = OAuthClient {
            id: Uuid::new_v4(),
            client_id: DEMO_CLIENT_ID.to_string(),
            client_secret_hash: Some(crypto::hash_token(DEMO_CLIENT_SECRET)),
            name: "Bible Dev".to_string(),
            redirect_uris: vec!["http://localhost:3000/callback".to_string()],
            allowed_scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
            allowed_grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "client_credentials".to_string(),
            ],
            is_confidential: true,
            created_at: now,
        };
        resources.database.create_client(&client).await?;
        println!("Seeded demo client: {DEMO_CLIENT_ID} / {DEMO_CLIENT_SECRET}");
    }

    if resources.database.get_user_by_email(DEMO_EMAIL).await?.is_none() {
        let password_hash = crypto::hash_password(DEMO_PASSWORD, bcrypt_cost)?;
        let user = User {
            id: Uuid::new_v4(),
            email: DEMO_EMAIL.to_string(),
            email_verified: true,
            password_hash,
            display_name: Some("Demo User".to_string()),
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: now,
        };
        resources.database.create_user(&user).await?;
        println!("Seeded demo user: {DEMO_EMAIL} / {DEMO_PASSWORD}");
    }

    Ok(())
}
