// ABOUTME: Configuration management for the auth service
// ABOUTME: Environment-only configuration; no config files are read
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

/// Environment-based configuration management
pub mod environment;

pub use environment::ServerConfig;
