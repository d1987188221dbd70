// ABOUTME: OAuth 2.1 HTTP route handlers: authorize, consent, token, revoke
// ABOUTME: Thin axum wrappers; protocol logic lives in the provider

use super::clients::extract_client_credentials;
use super::models::{
    AuthorizeParams, ConsentRequest, OAuthError, RedirectResponse, RevokeRequest, TokenRequest,
};
use super::provider::AuthorizeOutcome;
use crate::credentials::Claims;
use crate::resources::ServerResources;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::sync::Arc;
use uuid::Uuid;

/// Routes that require an authenticated end-user (the authorize flow)
pub fn user_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/authorize", get(handle_authorize))
        .route("/authorize/consent", post(handle_consent))
}

/// Routes authenticated by client credentials instead of an end-user
pub fn client_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/token", post(handle_token))
        .route("/revoke", post(handle_revoke))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

fn redirect_response(headers: &HeaderMap, url: String) -> Response {
    if wants_json(headers) {
        (StatusCode::OK, Json(RedirectResponse { redirect_to: url })).into_response()
    } else {
        (StatusCode::FOUND, [(LOCATION, url)]).into_response()
    }
}

fn end_user(claims: &Claims) -> Result<Uuid, OAuthError> {
    Uuid::parse_str(&claims.subject)
        .map_err(|_| OAuthError::invalid_request("end-user authentication required"))
}

/// GET /authorize
async fn handle_authorize(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Result<Response, OAuthError> {
    let user_id = end_user(&claims)?;

    match resources.oauth_provider.authorize(user_id, &params).await? {
        AuthorizeOutcome::ConsentRequired(prompt) => {
            Ok((StatusCode::OK, Json(*prompt)).into_response())
        }
        AuthorizeOutcome::Redirect(url) => Ok(redirect_response(&headers, url)),
    }
}

/// POST /authorize/consent
async fn handle_consent(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(request): Json<ConsentRequest>,
) -> Result<Response, OAuthError> {
    let user_id = end_user(&claims)?;

    let url = resources
        .oauth_provider
        .consent(user_id, &request.decision, &request.params)
        .await?;
    Ok(redirect_response(&headers, url))
}

fn require_form_encoding(headers: &HeaderMap) -> Result<(), OAuthError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok(())
    } else {
        Err(OAuthError::invalid_request(
            "requests must be application/x-www-form-urlencoded",
        ))
    }
}

/// POST /token
async fn handle_token(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, OAuthError> {
    require_form_encoding(&headers)?;

    let request: TokenRequest = serde_urlencoded::from_str(&body)
        .map_err(|e| OAuthError::invalid_request(&format!("malformed form body: {e}")))?;

    let credentials = extract_client_credentials(&headers, &request)?;
    let response = resources.oauth_provider.token(credentials, request).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// POST /revoke (RFC 7009). Succeeds regardless of whether the token
/// resolved, so existence is never leaked.
async fn handle_revoke(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, OAuthError> {
    require_form_encoding(&headers)?;

    let request: RevokeRequest = serde_urlencoded::from_str(&body)
        .map_err(|e| OAuthError::invalid_request(&format!("malformed form body: {e}")))?;

    let token = request
        .token
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("token is required"))?;

    resources.oauth_provider.revoke(token).await?;
    Ok(StatusCode::OK.into_response())
}
