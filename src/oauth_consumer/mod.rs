// ABOUTME: OAuth consumer flow: this service as a client to Google and GitHub
// ABOUTME: Accounts are linked strictly by provider-verified email
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # OAuth Consumer (Inbound Third-Party Login)
//!
//! The service signs users in through external providers. The outbound
//! `state` parameter lives in an in-memory store with per-entry expiry; the
//! callback consumes it exactly once. Token and userinfo exchanges run on a
//! dedicated HTTP client with a 10-second total timeout. Only
//! provider-verified emails may resolve to an account.

/// Provider profiles and the code/userinfo exchange
pub mod providers;

/// HTTP route handlers for the redirect and callback
pub mod routes;

/// In-memory CSRF state store with a background sweeper
pub mod state;

pub use state::OAuthStateStore;
