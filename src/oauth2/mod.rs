// ABOUTME: OAuth 2.1 authorization server: this service as provider
// ABOUTME: Authorize, consent, token, and revoke endpoints with PKCE and rotation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # OAuth 2.1 Authorization Server
//!
//! Implements the authorization-code grant with mandatory PKCE (S256 only)
//! and mandatory `state`, client credentials for confidential clients, and
//! refresh rotation with reuse detection: replaying a rotated refresh token
//! revokes every token minted from the same grant.

/// Client registration and authentication
pub mod clients;

/// Request/response models and the RFC 6749 error shape
pub mod models;

/// Authorization server endpoints logic
pub mod provider;

/// HTTP route handlers
pub mod routes;
