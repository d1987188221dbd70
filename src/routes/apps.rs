// ABOUTME: App management routes: create and list apps with rate-limit configuration
// ABOUTME: Credentials attached to an app inherit its limits through claims

use super::auth::claims_user_id;
use crate::credentials::Claims;
use crate::errors::AppError;
use crate::models::App;
use crate::resources::ServerResources;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct CreateAppRequest {
    name: String,
    #[serde(rename = "rateLimitRps", default)]
    rate_limit_rps: Option<i64>,
    #[serde(rename = "rateLimitWindowSeconds", default)]
    rate_limit_window_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AppSummary {
    id: String,
    name: String,
    #[serde(rename = "rateLimitRps", skip_serializing_if = "Option::is_none")]
    rate_limit_rps: Option<i64>,
    #[serde(rename = "rateLimitWindowSeconds", skip_serializing_if = "Option::is_none")]
    rate_limit_window_seconds: Option<i64>,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl From<&App> for AppSummary {
    fn from(app: &App) -> Self {
        Self {
            id: app.id.to_string(),
            name: app.name.clone(),
            rate_limit_rps: app.rate_limit_rps,
            rate_limit_window_seconds: app.rate_limit_window_seconds,
            created_at: app.created_at.to_rfc3339(),
        }
    }
}

/// App routes; all require full authentication
pub fn routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/apps", post(handle_create))
        .route("/apps", get(handle_list))
}

/// POST /apps
async fn handle_create(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateAppRequest>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;

    if request.name.trim().is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }
    if request.rate_limit_rps.is_some_and(|rps| rps <= 0) {
        return Err(AppError::validation("rateLimitRps must be positive"));
    }
    if request
        .rate_limit_window_seconds
        .is_some_and(|window| window <= 0)
    {
        return Err(AppError::validation("rateLimitWindowSeconds must be positive"));
    }

    let app = App {
        id: Uuid::new_v4(),
        user_id,
        name: request.name,
        rate_limit_rps: request.rate_limit_rps,
        rate_limit_window_seconds: request.rate_limit_window_seconds,
        revoked_at: None,
        created_at: Utc::now(),
    };
    resources.database.create_app(&app).await?;

    tracing::info!(%user_id, app_id = %app.id, "created app");
    Ok((StatusCode::CREATED, Json(AppSummary::from(&app))).into_response())
}

/// GET /apps
async fn handle_list(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    let apps = resources.database.list_apps_for_user(user_id).await?;
    let summaries: Vec<AppSummary> = apps.iter().map(AppSummary::from).collect();
    Ok((StatusCode::OK, Json(summaries)).into_response())
}
