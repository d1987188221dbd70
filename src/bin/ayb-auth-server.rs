// ABOUTME: Server binary: environment configuration, logging, then serve
// ABOUTME: All configuration comes from environment variables
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use anyhow::Result;
use ayb_auth_server::{config::ServerConfig, logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let config = ServerConfig::from_env()?;
    server::run(config).await
}
