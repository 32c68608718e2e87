// ABOUTME: Structured logging configuration built on tracing-subscriber
// ABOUTME: Environment-driven level/format selection with noise reduction for dependencies
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Logging Configuration
//!
//! Initializes the global tracing subscriber from environment variables.
//! Audit events share this pipeline under `target: "audit"`; see
//! [`crate::audit`].

use anyhow::Result;
use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON output for log aggregation
    Json,
    /// Human-readable output for development
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include file/line locations
    pub include_location: bool,
}

impl LoggingConfig {
    /// Build configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        let is_production =
            env::var("ENVIRONMENT").is_ok_and(|environment| environment == "production");

        Self {
            level,
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
        }
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    /// Returns an error if a filter directive fails to parse or the
    /// subscriber is already set
    pub fn init(&self) -> Result<()> {
        let env_filter = env::var("RUST_LOG")
            .map_or_else(|_| EnvFilter::new(&self.level), EnvFilter::new)
            .add_directive("hyper=warn".parse()?)
            .add_directive("sqlx=warn".parse()?)
            .add_directive("tower_http=info".parse()?)
            .add_directive(format!("keystone_sso={}", self.level).parse()?);

        let registry = tracing_subscriber::registry().with(env_filter);

        match self.format {
            LogFormat::Json => {
                let json_layer = fmt::layer()
                    .json()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true);
                registry.with(json_layer).try_init()?;
            }
            LogFormat::Pretty => {
                let pretty_layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true);
                registry.with(pretty_layer).try_init()?;
            }
            LogFormat::Compact => {
                let compact_layer = fmt::layer().compact().with_target(false);
                registry.with(compact_layer).try_init()?;
            }
        }

        Ok(())
    }
}

/// Initialize logging from environment variables
///
/// # Errors
/// Returns an error if subscriber initialization fails
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}
