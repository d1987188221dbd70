// ABOUTME: Logging configuration and structured logging setup
// ABOUTME: Configures tracing-subscriber with env-filter and selectable output format
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Production logging with structured output
//!
//! `RUST_LOG` controls the filter, `LOG_FORMAT` the output shape
//! (`pretty` for development, `json` for production, `compact` otherwise).

use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

impl LogFormat {
    /// Read from `LOG_FORMAT`, defaulting to pretty
    #[must_use]
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            Ok("compact") => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored so tests can
/// initialize logging without coordinating.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match LogFormat::from_env() {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    if result.is_ok() {
        tracing::info!(
            service = crate::constants::SERVICE_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "logging initialized"
        );
    }
}
