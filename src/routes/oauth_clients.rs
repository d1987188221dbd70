// ABOUTME: OAuth client management routes: register, list, revoke relying parties
// ABOUTME: The client secret appears exactly once, in the registration response

use super::auth::claims_user_id;
use crate::credentials::Claims;
use crate::errors::AppError;
use crate::oauth2::clients::RegisterClientRequest;
use crate::oauth2::models::OAuthClient;
use crate::resources::ServerResources;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct ClientSummary {
    #[serde(rename = "clientId")]
    client_id: String,
    name: String,
    #[serde(rename = "appId")]
    app_id: String,
    #[serde(rename = "redirectUris")]
    redirect_uris: Vec<String>,
    scopes: Vec<String>,
    #[serde(rename = "clientType")]
    client_type: String,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl From<&OAuthClient> for ClientSummary {
    fn from(client: &OAuthClient) -> Self {
        Self {
            client_id: client.client_id.clone(),
            name: client.name.clone(),
            app_id: client.app_id.to_string(),
            redirect_uris: client.redirect_uris.clone(),
            scopes: client.scopes.clone(),
            client_type: client.client_type.as_str().to_owned(),
            created_at: client.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterClientResponse {
    /// Plaintext secret, shown exactly once; absent for public clients
    #[serde(rename = "clientSecret", skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(flatten)]
    summary: ClientSummary,
}

/// OAuth client routes; all require full authentication
pub fn routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/oauth-clients", post(handle_register))
        .route("/oauth-clients", get(handle_list))
        .route("/oauth-clients/{client_id}", delete(handle_revoke))
}

/// POST /oauth-clients
async fn handle_register(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<RegisterClientRequest>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;

    let (client, secret) = resources
        .oauth_provider
        .clients()
        .register(user_id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterClientResponse {
            client_secret: secret,
            summary: ClientSummary::from(&client),
        }),
    )
        .into_response())
}

/// GET /oauth-clients
async fn handle_list(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;
    let clients = resources
        .database
        .list_oauth_clients_for_user(user_id)
        .await?;
    let summaries: Vec<ClientSummary> = clients.iter().map(ClientSummary::from).collect();
    Ok((StatusCode::OK, Json(summaries)).into_response())
}

/// DELETE /oauth-clients/{client_id}
async fn handle_revoke(
    State(resources): State<Arc<ServerResources>>,
    Extension(claims): Extension<Claims>,
    Path(client_id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = claims_user_id(&claims)?;

    if resources
        .database
        .revoke_oauth_client(&client_id, user_id)
        .await?
    {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(AppError::not_found("OAuth client"))
    }
}
