// ABOUTME: Main library entry point for the ayb auth server
// ABOUTME: Exposes the identity provider, OAuth 2.1 authorization server, and credential router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

#![deny(unsafe_code)]

//! # ayb auth server
//!
//! An authentication and authorization service that acts as a first-party
//! identity provider (registration, login, sessions, passwordless flows,
//! SMS MFA) and as a full OAuth 2.1 authorization server (authorization code
//! with PKCE, client credentials, refresh rotation with reuse detection,
//! token revocation, consent).
//!
//! Three bearer-credential families share one validation surface:
//!
//! - **Signed access tokens**: short-lived HS256 tokens, not persisted
//! - **API keys**: opaque `ayb_` credentials with scope and table restrictions
//! - **OAuth tokens**: opaque `ayb_at_` / `ayb_rt_` credentials backed by rows
//!
//! Every validator produces the same [`credentials::Claims`] shape, which
//! downstream handlers use for scope and table-level authorization.

/// Signed-token management: HS256 issuance, validation, secret rotation
pub mod auth;

/// Environment-based configuration management
pub mod config;

/// Credential prefixes, token durations, and protocol limits
pub mod constants;

/// Credential classification, generation, and the unified claims model
pub mod credentials;

/// Random credential material and digest helpers
pub mod crypto;

/// Persistence adapter: migrations and atomic SQL operations
pub mod database;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// Outbound collaborator interfaces: mailer and SMS provider
pub mod external;

/// Production logging and structured output
pub mod logging;

/// HTTP middleware: credential router and rate limit enforcement
pub mod middleware;

/// Persistence models shared across services
pub mod models;

/// OAuth 2.1 authorization server (this service as provider)
pub mod oauth2;

/// OAuth consumer flow (this service as client to Google/GitHub)
pub mod oauth_consumer;

/// Password hashing, multi-format verification, and progressive upgrade
pub mod password;

/// Phone number normalization and country derivation
pub mod phone;

/// In-memory sliding-window rate limiters
pub mod rate_limiting;

/// Shared server state handed to route handlers
pub mod resources;

/// HTTP route handlers and router assembly
pub mod routes;

/// Server bootstrap and graceful shutdown
pub mod server;

/// Domain service layer for protocol-agnostic business logic
pub mod services;
