// ABOUTME: HTTP middleware for the auth service
// ABOUTME: Credential routing and rate limit enforcement with header emission
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

/// Credential router middleware: RequireAuth / OptionalAuth / RequireMFAPending
pub mod auth;

/// Per-IP and per-app rate limit middleware with header emission
pub mod rate_limiting;

pub use auth::{optional_auth, require_auth, require_mfa_pending, MfaPendingClaims};
