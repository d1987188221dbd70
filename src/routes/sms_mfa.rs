// ABOUTME: SMS login and MFA route handlers
// ABOUTME: Challenge and verify accept only pending tokens, enrollment only full tokens

use super::auth::{claims_user_id, AuthTokensResponse};
use crate::credentials::Claims;
use crate::errors::AppError;
use crate::middleware::MfaPendingClaims;
use crate::resources::ServerResources;
use crate::services::SmsPurpose;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct PhoneRequest {
    phone: String,
}

#[derive(Debug, Deserialize)]
struct SmsConfirmRequest {
    phone: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct CodeRequest {
    code: String,
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

/// Public SMS login endpoints
pub fn public_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/sms", post(handle_request_code))
        .route("/sms/confirm", post(handle_confirm_code))
}

/// Enrollment endpoints; require a full credential
pub fn protected_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/mfa/sms/enroll", post(handle_enroll))
        .route("/mfa/sms/enroll/confirm", post(handle_enroll_confirm))
}

/// Second-factor endpoints; require a pending token
pub fn pending_routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/mfa/sms/challenge", post(handle_challenge))
        .route("/mfa/sms/verify", post(handle_verify))
}

/// POST /sms — always 200 for valid requests, whether or not a code went out
async fn handle_request_code(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<PhoneRequest>,
) -> Result<Response, AppError> {
    resources
        .sms
        .request_code(&request.phone, SmsPurpose::Login)
        .await?;
    Ok(ok_message("If the number is eligible, a code is on its way"))
}

/// POST /sms/confirm
async fn handle_confirm_code(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<SmsConfirmRequest>,
) -> Result<Response, AppError> {
    let (user, tokens) = resources
        .sms
        .confirm_login(&request.phone, &request.code)
        .await?;
    Ok((StatusCode::OK, Json(AuthTokensResponse::new(&user, tokens))).into_response())
}

/// POST /mfa/sms/enroll
async fn handle_enroll(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PhoneRequest>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    resources.mfa.enroll(user_id, &request.phone).await?;
    Ok(ok_message("Enrollment code sent"))
}

/// POST /mfa/sms/enroll/confirm
async fn handle_enroll_confirm(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CodeRequest>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    resources
        .mfa
        .confirm_enrollment(user_id, &request.code)
        .await?;
    Ok(ok_message("SMS MFA enabled"))
}

/// POST /mfa/sms/challenge — pending token only
async fn handle_challenge(
    State(resources): State<Arc<ServerResources>>,
    Extension(pending): Extension<MfaPendingClaims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&pending.0)?;
    resources.mfa.challenge(user_id).await?;
    Ok(ok_message("MFA code sent"))
}

/// POST /mfa/sms/verify — pending token only; mints full credentials
async fn handle_verify(
    State(resources): State<Arc<ServerResources>>,
    Extension(pending): Extension<MfaPendingClaims>,
    Json(request): Json<CodeRequest>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&pending.0)?;
    let (user, tokens) = resources.mfa.verify(user_id, &request.code).await?;
    Ok((StatusCode::OK, Json(AuthTokensResponse::new(&user, tokens))).into_response())
}
