// ABOUTME: Router assembly: public, authenticated, and MFA-pending route groups
// ABOUTME: Applies the credential router and rate limiters as group-wide layers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Route Assembly
//!
//! Three route groups with different authentication layers:
//!
//! - **public**: registration, login, passwordless flows, the OAuth token and
//!   revoke endpoints, and the consumer flow, behind the per-IP limiter
//! - **protected**: everything requiring a full credential, behind the
//!   credential router and the per-app limiter
//! - **pending**: the MFA challenge/verify pair, reachable only with a
//!   pending token

/// Identity route handlers
pub mod auth;

/// API key management
pub mod api_keys;

/// App management
pub mod apps;

/// OAuth client management
pub mod oauth_clients;

/// SMS login and MFA handlers
pub mod sms_mfa;

use crate::middleware::rate_limiting::{app_rate_limit, ip_rate_limit};
use crate::middleware::{require_auth, require_mfa_pending};
use crate::resources::ServerResources;
use axum::middleware::from_fn_with_state;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    let public = Router::new()
        .merge(auth::public_routes())
        .merge(sms_mfa::public_routes())
        .merge(crate::oauth2::routes::client_routes())
        .merge(crate::oauth_consumer::routes::routes())
        .layer(from_fn_with_state(resources.clone(), ip_rate_limit));

    let protected = Router::new()
        .merge(auth::protected_routes())
        .merge(sms_mfa::protected_routes())
        .merge(api_keys::routes())
        .merge(apps::routes())
        .merge(oauth_clients::routes())
        .merge(crate::oauth2::routes::user_routes())
        // inner layer runs after the outer auth layer has attached claims
        .layer(from_fn_with_state(resources.clone(), app_rate_limit))
        .layer(from_fn_with_state(resources.clone(), require_auth));

    let pending = Router::new()
        .merge(sms_mfa::pending_routes())
        .layer(from_fn_with_state(resources.clone(), require_mfa_pending));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(pending)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(resources)
}
