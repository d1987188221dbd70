// ABOUTME: API key management routes: create, list, revoke
// ABOUTME: The plaintext key appears exactly once, in the creation response

use super::auth::claims_user_id;
use crate::credentials::{self, Claims, SCOPE_ALL, SCOPE_READONLY, SCOPE_READWRITE};
use crate::errors::AppError;
use crate::models::ApiKey;
use crate::resources::ServerResources;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct CreateApiKeyRequest {
    name: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(rename = "allowedTables", default)]
    allowed_tables: Option<Vec<String>>,
    #[serde(rename = "appId", default)]
    app_id: Option<String>,
    #[serde(rename = "expiresInDays", default)]
    expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ApiKeySummary {
    id: String,
    name: String,
    #[serde(rename = "keyPrefix")]
    key_prefix: String,
    scope: String,
    #[serde(rename = "allowedTables")]
    allowed_tables: Vec<String>,
    #[serde(rename = "appId", skip_serializing_if = "Option::is_none")]
    app_id: Option<String>,
    #[serde(rename = "lastUsedAt", skip_serializing_if = "Option::is_none")]
    last_used_at: Option<String>,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl From<&ApiKey> for ApiKeySummary {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.to_string(),
            name: key.name.clone(),
            key_prefix: key.key_prefix.clone(),
            scope: key.scope.clone(),
            allowed_tables: key.allowed_tables.clone(),
            app_id: key.app_id.map(|id| id.to_string()),
            last_used_at: key.last_used_at.map(|at| at.to_rfc3339()),
            expires_at: key.expires_at.map(|at| at.to_rfc3339()),
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateApiKeyResponse {
    /// Full plaintext, shown exactly once
    key: String,
    #[serde(flatten)]
    summary: ApiKeySummary,
}

/// API key routes; all require full authentication
pub fn routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/api-keys", post(handle_create))
        .route("/api-keys", get(handle_list))
        .route("/api-keys/{id}", delete(handle_revoke))
}

/// POST /api-keys
async fn handle_create(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;

    if request.name.trim().is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }
    let scope = request.scope.unwrap_or_else(|| SCOPE_ALL.to_owned());
    if !matches!(scope.as_str(), SCOPE_ALL | SCOPE_READONLY | SCOPE_READWRITE) {
        return Err(AppError::validation(format!("unknown scope: {scope}")));
    }

    let app_id = match request.app_id.as_deref() {
        Some(raw) => {
            let app_id = Uuid::parse_str(raw)
                .map_err(|_| AppError::validation("appId must be a UUID"))?;
            let app = resources
                .database
                .get_app(app_id)
                .await?
                .filter(|app| app.user_id == user_id && app.revoked_at.is_none())
                .ok_or_else(|| AppError::not_found("app"))?;
            Some(app.id)
        }
        None => None,
    };

    let material = credentials::generate_api_key();
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id,
        name: request.name,
        key_hash: material.key_hash,
        key_prefix: material.display_prefix,
        scope,
        allowed_tables: request.allowed_tables.unwrap_or_default(),
        app_id,
        last_used_at: None,
        expires_at: request
            .expires_in_days
            .filter(|days| *days > 0)
            .map(|days| Utc::now() + Duration::days(days)),
        revoked_at: None,
        created_at: Utc::now(),
    };
    resources.database.create_api_key(&key).await?;

    tracing::info!(user_id = %user_id, key_prefix = %key.key_prefix, "created API key");

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            key: material.plaintext,
            summary: ApiKeySummary::from(&key),
        }),
    )
        .into_response())
}

/// GET /api-keys
async fn handle_list(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    let keys = resources.database.list_api_keys_for_user(user_id).await?;
    let summaries: Vec<ApiKeySummary> = keys.iter().map(ApiKeySummary::from).collect();
    Ok((StatusCode::OK, Json(summaries)).into_response())
}

/// DELETE /api-keys/{id}
async fn handle_revoke(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    let key_id = Uuid::parse_str(&id).map_err(|_| AppError::not_found("API key"))?;

    if resources.database.revoke_api_key(key_id, user_id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(AppError::not_found("API key"))
    }
}
