// ABOUTME: HTTP handlers for third-party login: provider redirect and callback
// ABOUTME: The callback links accounts only through provider-verified emails

use super::providers::{exchange_code, Provider};
use crate::errors::AppError;
use crate::resources::ServerResources;
use crate::routes::auth::AuthTokensResponse;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

/// Routes for the outbound consumer flow
pub fn routes() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/oauth/{provider}", get(handle_redirect))
        .route("/oauth/{provider}/callback", get(handle_callback))
}

fn provider_config<'a>(
    resources: &'a ServerResources,
    provider: Provider,
) -> Result<&'a crate::config::environment::OAuthProviderConfig, AppError> {
    let config = match provider {
        Provider::Google => resources.config.google_oauth.as_ref(),
        Provider::Github => resources.config.github_oauth.as_ref(),
    };
    config.ok_or_else(|| {
        AppError::validation(format!("{} login is not configured", provider.name()))
    })
}

fn callback_uri(resources: &ServerResources, provider: Provider) -> String {
    format!(
        "{}/oauth/{}/callback",
        resources.config.external_url,
        provider.name()
    )
}

/// GET /oauth/{provider}
async fn handle_redirect(
    State(resources): State<Arc<ServerResources>>,
    Path(provider): Path<String>,
) -> Result<Response, AppError> {
    let provider = Provider::parse(&provider)
        .ok_or_else(|| AppError::not_found(format!("provider '{provider}'")))?;
    let config = provider_config(&resources, provider)?;

    let state = resources.oauth_states.issue();
    let url = provider.authorize_url(config, &callback_uri(&resources, provider), &state);

    Ok((StatusCode::TEMPORARY_REDIRECT, [(LOCATION, url)]).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /oauth/{provider}/callback
async fn handle_callback(
    State(resources): State<Arc<ServerResources>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let provider = Provider::parse(&provider)
        .ok_or_else(|| AppError::not_found(format!("provider '{provider}'")))?;
    let config = provider_config(&resources, provider)?;

    if let Some(error) = params.error {
        return Err(AppError::auth_invalid(format!(
            "provider returned an error: {error}"
        )));
    }
    let state = params
        .state
        .as_deref()
        .ok_or_else(|| AppError::validation("state is required"))?;
    if !resources.oauth_states.consume(state) {
        return Err(AppError::auth_invalid("invalid or expired state"));
    }
    let code = params
        .code
        .as_deref()
        .ok_or_else(|| AppError::validation("code is required"))?;

    let profile = exchange_code(
        provider,
        config,
        &resources.http_client,
        &callback_uri(&resources, provider),
        code,
    )
    .await?;

    if !profile.email_verified {
        return Err(AppError::auth_invalid(
            "provider email is not verified; cannot link account",
        ));
    }

    let user = resources
        .identity
        .find_or_create_by_email(&profile.email)
        .await?;
    let tokens = resources.identity.issue_tokens(&user).await?;

    tracing::info!(provider = provider.name(), user_id = %user.id, "third-party login completed");

    Ok((
        StatusCode::OK,
        Json(AuthTokensResponse::new(&user, tokens)),
    )
        .into_response())
}
