// ABOUTME: Identity route handlers: register, login, refresh, logout, account, passwordless
// ABOUTME: Thin wrappers that map service error kinds to HTTP through AppError

use crate::credentials::Claims;
use crate::errors::AppError;
use crate::models::{User, UserInfo};
use crate::resources::ServerResources;
use crate::services::IssuedTokens;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Token response shared by login, register, refresh, and the passwordless
/// flows. Under MFA the refresh token is empty and `mfaRequired` is set.
#[derive(Debug, Serialize)]
pub struct AuthTokensResponse {
    /// Signed access token, or a pending token under MFA
    pub token: String,
    /// Opaque refresh token; empty under MFA
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    /// Present and true only when MFA verification is still required
    #[serde(rename = "mfaRequired", skip_serializing_if = "std::ops::Not::not")]
    pub mfa_required: bool,
    /// The authenticated user
    pub user: UserInfo,
}

impl AuthTokensResponse {
    /// Assemble from a user and issued tokens
    #[must_use]
    pub fn new(user: &User, tokens: IssuedTokens) -> Self {
        Self {
            token: tokens.token,
            refresh_token: tokens.refresh_token,
            mfa_required: tokens.mfa_required,
            user: UserInfo::from(user),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct EmailRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ResetConfirmRequest {
    token: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

fn ok_message(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: message.to_owned(),
        }),
    )
        .into_response()
}

/// Extract the user id from validated claims
pub fn claims_user_id(claims: &Claims) -> Result<Uuid, AppError> {
    Uuid::parse_str(&claims.subject)
        .map_err(|_| AppError::auth_invalid("credential is not bound to a user"))
}

/// Public identity endpoints
pub fn public_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/refresh", post(handle_refresh))
        .route("/logout", post(handle_logout))
        .route("/password-reset", post(handle_password_reset))
        .route("/password-reset/confirm", post(handle_password_reset_confirm))
        .route("/verify", post(handle_verify))
        .route("/magic-link", post(handle_magic_link))
        .route("/magic-link/confirm", post(handle_magic_link_confirm))
}

/// Endpoints that require a full (non-pending) credential
pub fn protected_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/me", get(handle_me))
        .route("/me", delete(handle_delete_me))
        .route("/verify/resend", post(handle_verify_resend))
}

/// POST /register
async fn handle_register(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let (user, tokens) = resources
        .identity
        .register(&request.email, &request.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthTokensResponse::new(&user, tokens)),
    )
        .into_response())
}

/// POST /login
async fn handle_login(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let (user, tokens) = resources
        .identity
        .login(&request.email, &request.password)
        .await?;
    Ok((StatusCode::OK, Json(AuthTokensResponse::new(&user, tokens))).into_response())
}

/// POST /refresh
async fn handle_refresh(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Response, AppError> {
    let (user, tokens) = resources.identity.refresh(&request.refresh_token).await?;
    Ok((StatusCode::OK, Json(AuthTokensResponse::new(&user, tokens))).into_response())
}

/// POST /logout
async fn handle_logout(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Response, AppError> {
    resources.identity.logout(&request.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /me
async fn handle_me(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    let user = resources.identity.get_user(user_id).await?;
    Ok((StatusCode::OK, Json(UserInfo::from(&user))).into_response())
}

/// DELETE /me
async fn handle_delete_me(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    resources.identity.delete_account(user_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /password-reset — always 200, whether or not the email exists
async fn handle_password_reset(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<EmailRequest>,
) -> Result<Response, AppError> {
    resources
        .identity
        .request_password_reset(&request.email)
        .await?;
    Ok(ok_message("If the account exists, a reset mail is on its way"))
}

/// POST /password-reset/confirm
async fn handle_password_reset_confirm(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<ResetConfirmRequest>,
) -> Result<Response, AppError> {
    resources
        .identity
        .confirm_password_reset(&request.token, &request.password)
        .await?;
    Ok(ok_message("Password updated"))
}

/// POST /verify
async fn handle_verify(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<TokenBody>,
) -> Result<Response, AppError> {
    resources.identity.verify_email(&request.token).await?;
    Ok(ok_message("Email verified"))
}

/// POST /verify/resend
async fn handle_verify_resend(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    resources.identity.resend_verification(user_id).await?;
    Ok(ok_message("Verification mail sent"))
}

/// POST /magic-link — always 200
async fn handle_magic_link(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<EmailRequest>,
) -> Result<Response, AppError> {
    resources.identity.request_magic_link(&request.email).await?;
    Ok(ok_message("If the address is valid, a sign-in link is on its way"))
}

/// POST /magic-link/confirm
async fn handle_magic_link_confirm(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<TokenBody>,
) -> Result<Response, AppError> {
    let (user, tokens) = resources.identity.confirm_magic_link(&request.token).await?;
    Ok((StatusCode::OK, Json(AuthTokensResponse::new(&user, tokens))).into_response())
}
