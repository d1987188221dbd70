// ABOUTME: Server bootstrap: config, database, router, serve, graceful shutdown
// ABOUTME: Background tasks are joined after the listener drains
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use crate::config::ServerConfig;
use crate::database::Database;
use crate::external::{LogMailer, LogSmsProvider};
use crate::resources::ServerResources;
use crate::routes;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

/// Run the server until SIGINT or SIGTERM, then drain and stop background
/// tasks.
pub async fn run(config: ServerConfig) -> Result<()> {
    let database = Database::new(&config.database_url.to_connection_string())
        .await
        .context("failed to open database")?;

    let resources = ServerResources::new(
        config,
        database,
        Arc::new(LogMailer),
        Arc::new(LogSmsProvider),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], resources.config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    let app = routes::router(resources.clone());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    resources.shutdown_background().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
