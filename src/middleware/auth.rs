// ABOUTME: Credential router middleware for request authentication
// ABOUTME: Classifies the bearer by prefix and attaches uniform claims to the request

//! # Authentication Middleware
//!
//! `require_auth` validates any of the three credential families and
//! attaches [`Claims`] to the request; MFA pending tokens are rejected here.
//! `optional_auth` attaches claims when present and valid, silently dropping
//! pending tokens. `require_mfa_pending` accepts only pending signed tokens
//! and stashes them under a distinct type, so MFA endpoints cannot be
//! reached with a full token and vice versa.

use crate::auth::TokenValidationError;
use crate::credentials::{classify, Claims, CredentialKind};
use crate::crypto;
use crate::errors::AppError;
use crate::resources::ServerResources;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use std::sync::Arc;

/// Claims from a pending token, stored under a type distinct from [`Claims`]
/// so the two authentication levels cannot be confused
#[derive(Debug, Clone)]
pub struct MfaPendingClaims(pub Claims);

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(AppError::auth_required)?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::auth_invalid("authorization header must be 'Bearer <credential>'"))
}

/// Validate a bearer credential of any family and produce uniform claims
pub async fn authenticate_bearer(
    resources: &ServerResources,
    bearer: &str,
) -> Result<Claims, AppError> {
    match classify(bearer) {
        CredentialKind::OAuthAccessToken => {
            let info = resources
                .oauth_provider
                .validate_access_token(bearer)
                .await
                .map_err(|e| AppError::database(e.to_string()))?
                .ok_or_else(|| AppError::auth_invalid("invalid or expired access token"))?;

            Ok(Claims {
                subject: info.user_id.map(|id| id.to_string()).unwrap_or_default(),
                email: info.email.unwrap_or_default(),
                api_key_scope: info.scope,
                allowed_tables: info.allowed_tables.unwrap_or_default(),
                app_id: Some(info.app_id.to_string()),
                app_rate_limit_rps: info.app_rate_limit_rps,
                app_rate_limit_window_seconds: info.app_rate_limit_window_seconds,
                mfa_pending: false,
            })
        }
        CredentialKind::ApiKey => {
            let auth = resources
                .database
                .get_api_key_for_auth(&crypto::sha256_hex(bearer))
                .await
                .map_err(|e| AppError::database(e.to_string()))?
                .ok_or_else(|| AppError::auth_invalid("invalid API key"))?;

            if auth.key.expires_at.is_some_and(|expiry| expiry <= Utc::now()) {
                return Err(AppError::auth_invalid("API key expired"));
            }

            let database = resources.database.clone();
            let key_id = auth.key.id;
            tokio::spawn(async move {
                if let Err(e) = database.touch_api_key_last_used(key_id).await {
                    tracing::debug!(%key_id, "last_used update failed: {e}");
                }
            });

            Ok(Claims {
                subject: auth.key.user_id.to_string(),
                email: auth.email,
                api_key_scope: auth.key.scope,
                allowed_tables: auth.key.allowed_tables,
                app_id: auth.key.app_id.map(|id| id.to_string()),
                app_rate_limit_rps: auth.app_rate_limit_rps,
                app_rate_limit_window_seconds: auth.app_rate_limit_window_seconds,
                mfa_pending: false,
            })
        }
        CredentialKind::SignedToken => {
            let claims = resources.auth.validate_token(bearer).map_err(|e| match e {
                TokenValidationError::Expired => AppError::auth_invalid("token expired"),
                TokenValidationError::Invalid(reason) => AppError::auth_invalid(reason),
            })?;
            Ok(claims.into_claims())
        }
    }
}

/// Reject the request unless a valid, non-pending credential is presented
pub async fn require_auth(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = bearer_token(request.headers())?;
    let claims = authenticate_bearer(&resources, bearer).await?;

    if claims.mfa_pending {
        return Err(AppError::auth_invalid("MFA verification required"));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Attach claims when a valid credential is presented; never rejects.
/// Pending-token claims are dropped silently.
pub async fn optional_auth(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Ok(bearer) = bearer_token(request.headers()) {
        match authenticate_bearer(&resources, bearer).await {
            Ok(claims) if !claims.mfa_pending => {
                request.extensions_mut().insert(claims);
            }
            Ok(_) | Err(_) => {}
        }
    }
    next.run(request).await
}

/// Accept only signed tokens with `mfa_pending = true`
pub async fn require_mfa_pending(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = bearer_token(request.headers())?;

    if classify(bearer) != CredentialKind::SignedToken {
        return Err(AppError::auth_invalid("MFA pending token required"));
    }
    let claims = resources
        .auth
        .validate_token(bearer)
        .map_err(|e| match e {
            TokenValidationError::Expired => AppError::auth_invalid("token expired"),
            TokenValidationError::Invalid(reason) => AppError::auth_invalid(reason),
        })?
        .into_claims();

    if !claims.mfa_pending {
        return Err(AppError::auth_invalid("MFA pending token required"));
    }

    request.extensions_mut().insert(MfaPendingClaims(claims));
    Ok(next.run(request).await)
}
