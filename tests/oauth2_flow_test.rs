// ABOUTME: Integration tests for the OAuth 2.1 authorization-code flow with PKCE
// ABOUTME: Covers validation order, consent coverage, single-use codes, and client auth

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use ayb_auth_server::models::{App, User};
use ayb_auth_server::oauth2::clients::{ClientCredentials, RegisterClientRequest};
use ayb_auth_server::oauth2::models::{AuthorizeParams, OAuthClient, TokenRequest};
use ayb_auth_server::oauth2::provider::{generate_pkce_challenge, AuthorizeOutcome};
use ayb_auth_server::resources::ServerResources;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const REDIRECT: &str = "https://client.example.com/callback";

async fn setup_client(
    resources: &Arc<ServerResources>,
    client_type: &str,
    scopes: &[&str],
) -> (User, OAuthClient, Option<String>) {
    let email = format!("owner-{}@example.com", Uuid::new_v4());
    let (user, _tokens) = resources
        .identity
        .register(&email, "password123")
        .await
        .unwrap();

    let app = App {
        id: Uuid::new_v4(),
        user_id: user.id,
        name: "test app".into(),
        rate_limit_rps: None,
        rate_limit_window_seconds: None,
        revoked_at: None,
        created_at: Utc::now(),
    };
    resources.database.create_app(&app).await.unwrap();

    let (client, secret) = resources
        .oauth_provider
        .clients()
        .register(
            user.id,
            RegisterClientRequest {
                app_id: app.id.to_string(),
                name: "test client".into(),
                redirect_uris: vec![REDIRECT.into()],
                scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
                client_type: Some(client_type.into()),
            },
        )
        .await
        .unwrap();
    (user, client, secret)
}

fn authorize_params(client_id: &str, scope: &str, state: &str) -> AuthorizeParams {
    AuthorizeParams {
        response_type: Some("code".into()),
        client_id: Some(client_id.into()),
        redirect_uri: Some(REDIRECT.into()),
        scope: Some(scope.into()),
        state: Some(state.into()),
        code_challenge: Some(generate_pkce_challenge(VERIFIER)),
        code_challenge_method: Some("S256".into()),
        allowed_tables: None,
    }
}

fn credentials(client: &OAuthClient, secret: Option<&String>) -> ClientCredentials {
    ClientCredentials {
        client_id: client.client_id.clone(),
        client_secret: secret.cloned(),
    }
}

fn token_request(code: &str, verifier: &str) -> TokenRequest {
    TokenRequest {
        grant_type: Some("authorization_code".into()),
        code: Some(code.into()),
        redirect_uri: Some(REDIRECT.into()),
        code_verifier: Some(verifier.into()),
        client_id: None,
        client_secret: None,
        scope: None,
        refresh_token: None,
    }
}

fn code_from_redirect(url: &str) -> String {
    let parsed = url::Url::parse(url).unwrap();
    parsed
        .query_pairs()
        .find(|(name, _)| name == "code")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

/// Drive authorize + consent to a redirect URL carrying a fresh code
async fn obtain_code(
    resources: &Arc<ServerResources>,
    user: &User,
    params: &AuthorizeParams,
) -> String {
    match resources.oauth_provider.authorize(user.id, params).await.unwrap() {
        AuthorizeOutcome::ConsentRequired(_) => {
            let url = resources
                .oauth_provider
                .consent(user.id, "approve", params)
                .await
                .unwrap();
            code_from_redirect(&url)
        }
        AuthorizeOutcome::Redirect(url) => code_from_redirect(&url),
    }
}

#[tokio::test]
async fn authorize_prompts_then_consent_approve_mints_code() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, secret) = setup_client(&resources, "confidential", &["readonly"]).await;
    let params = authorize_params(&client.client_id, "readonly", "s1");

    // no prior consent: prompt with every parameter echoed
    let outcome = resources.oauth_provider.authorize(user.id, &params).await.unwrap();
    let AuthorizeOutcome::ConsentRequired(prompt) = outcome else {
        panic!("expected a consent prompt");
    };
    assert!(prompt.requires_consent);
    assert_eq!(prompt.client_id, client.client_id);
    assert_eq!(prompt.scope, "readonly");
    assert_eq!(prompt.state, "s1");
    assert_eq!(prompt.code_challenge, generate_pkce_challenge(VERIFIER));

    // approve: redirect carries code and state
    let url = resources
        .oauth_provider
        .consent(user.id, "approve", &params)
        .await
        .unwrap();
    assert!(url.starts_with(&format!("{REDIRECT}?code=")));
    assert!(url.ends_with("&state=s1"));

    // exchange the code
    let response = resources
        .oauth_provider
        .token(
            credentials(&client, secret.as_ref()),
            token_request(&code_from_redirect(&url), VERIFIER),
        )
        .await
        .unwrap();
    assert!(response.access_token.starts_with("ayb_at_"));
    assert_eq!(response.access_token.len(), 7 + 64);
    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 3600);
    assert_eq!(response.scope, "readonly");
    let refresh = response.refresh_token.unwrap();
    assert!(refresh.starts_with("ayb_rt_"));
    assert_eq!(refresh.len(), 7 + 96);

    // the minted access token validates and carries the grant context
    let info = resources
        .oauth_provider
        .validate_access_token(&response.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.user_id, Some(user.id));
    assert_eq!(info.scope, "readonly");
    assert_eq!(info.client_id, client.client_id);

    // replaying the code fails closed
    let err = resources
        .oauth_provider
        .token(
            credentials(&client, secret.as_ref()),
            token_request(&code_from_redirect(&url), VERIFIER),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    assert!(err.error_description.unwrap().contains("already used"));
}

#[tokio::test]
async fn covering_consent_skips_the_prompt() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, _secret) =
        setup_client(&resources, "confidential", &["readonly", "readwrite"]).await;

    let params = authorize_params(&client.client_id, "readonly", "s1");
    obtain_code(&resources, &user, &params).await;

    // same scope again: straight to redirect
    let outcome = resources.oauth_provider.authorize(user.id, &params).await.unwrap();
    assert!(matches!(outcome, AuthorizeOutcome::Redirect(_)));

    // a wider scope is not covered by the stored readonly consent
    let wider = authorize_params(&client.client_id, "readwrite", "s2");
    let outcome = resources.oauth_provider.authorize(user.id, &wider).await.unwrap();
    assert!(matches!(outcome, AuthorizeOutcome::ConsentRequired(_)));
}

#[tokio::test]
async fn consent_deny_redirects_with_access_denied() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, _secret) = setup_client(&resources, "confidential", &["readonly"]).await;
    let params = authorize_params(&client.client_id, "readonly", "s9");

    let url = resources
        .oauth_provider
        .consent(user.id, "deny", &params)
        .await
        .unwrap();
    assert_eq!(url, format!("{REDIRECT}?error=access_denied&state=s9"));
}

#[tokio::test]
async fn validation_order_is_stable() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, _secret) = setup_client(&resources, "confidential", &["readonly"]).await;

    // missing state precedes the (also broken) client lookup
    let mut params = authorize_params("ayb_cid_doesnotexist", "readonly", "s1");
    params.state = None;
    let err = resources.oauth_provider.authorize(user.id, &params).await.unwrap_err();
    assert_eq!(err.error, "invalid_request");
    assert!(err.error_description.unwrap().contains("state"));

    // unknown client
    let params = authorize_params(
        &format!("ayb_cid_{}", "0".repeat(48)),
        "readonly",
        "s1",
    );
    let err = resources.oauth_provider.authorize(user.id, &params).await.unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // method other than S256
    let mut params = authorize_params(&client.client_id, "readonly", "s1");
    params.code_challenge_method = Some("plain".into());
    let err = resources.oauth_provider.authorize(user.id, &params).await.unwrap_err();
    assert_eq!(err.error, "invalid_request");

    // trailing slash is a different redirect URI
    let mut params = authorize_params(&client.client_id, "readonly", "s1");
    params.redirect_uri = Some(format!("{REDIRECT}/"));
    let err = resources.oauth_provider.authorize(user.id, &params).await.unwrap_err();
    assert_eq!(err.error, "invalid_request");

    // scope outside the client's allow-list
    let params = authorize_params(&client.client_id, "readwrite", "s1");
    let err = resources.oauth_provider.authorize(user.id, &params).await.unwrap_err();
    assert_eq!(err.error, "invalid_scope");
}

#[tokio::test]
async fn pkce_failure_does_not_consume_the_code() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, secret) = setup_client(&resources, "confidential", &["readonly"]).await;
    let params = authorize_params(&client.client_id, "readonly", "s1");
    let code = obtain_code(&resources, &user, &params).await;

    // wrong verifier of valid length
    let err = resources
        .oauth_provider
        .token(
            credentials(&client, secret.as_ref()),
            token_request(&code, &"a".repeat(43)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // the code is still live: the correct verifier succeeds
    resources
        .oauth_provider
        .token(
            credentials(&client, secret.as_ref()),
            token_request(&code, VERIFIER),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn code_is_bound_to_client_and_redirect_uri() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, secret) = setup_client(&resources, "confidential", &["readonly"]).await;
    let (_other_user, other_client, other_secret) =
        setup_client(&resources, "confidential", &["readonly"]).await;

    let params = authorize_params(&client.client_id, "readonly", "s1");
    let code = obtain_code(&resources, &user, &params).await;

    // another authenticated client cannot redeem the code
    let err = resources
        .oauth_provider
        .token(
            credentials(&other_client, other_secret.as_ref()),
            token_request(&code, VERIFIER),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // redirect mismatch at exchange
    let code = obtain_code(&resources, &user, &params).await;
    let mut request = token_request(&code, VERIFIER);
    request.redirect_uri = Some(format!("{REDIRECT}/"));
    let err = resources
        .oauth_provider
        .token(credentials(&client, secret.as_ref()), request)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn client_credentials_grant_rules() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (_user, client, secret) =
        setup_client(&resources, "confidential", &["readonly"]).await;

    let request = TokenRequest {
        grant_type: Some("client_credentials".into()),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: None,
        client_secret: None,
        scope: Some("readonly".into()),
        refresh_token: None,
    };
    let response = resources
        .oauth_provider
        .token(credentials(&client, secret.as_ref()), request)
        .await
        .unwrap();
    assert!(response.refresh_token.is_none(), "no refresh for client credentials");

    // the token is not bound to a user
    let info = resources
        .oauth_provider
        .validate_access_token(&response.access_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.user_id, None);

    // scope beyond the client's registration
    let request = TokenRequest {
        grant_type: Some("client_credentials".into()),
        scope: Some("readwrite".into()),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: None,
        client_secret: None,
        refresh_token: None,
    };
    let err = resources
        .oauth_provider
        .token(credentials(&client, secret.as_ref()), request)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_scope");

    // public clients are rejected
    let (_user, public_client, _none) = setup_client(&resources, "public", &["readonly"]).await;
    let request = TokenRequest {
        grant_type: Some("client_credentials".into()),
        scope: Some("readonly".into()),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: None,
        client_secret: None,
        refresh_token: None,
    };
    let err = resources
        .oauth_provider
        .token(credentials(&public_client, None), request)
        .await
        .unwrap_err();
    assert_eq!(err.error, "unauthorized_client");
}

#[tokio::test]
async fn client_authentication_failures() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, client, secret) = setup_client(&resources, "confidential", &["readonly"]).await;
    let params = authorize_params(&client.client_id, "readonly", "s1");
    let code = obtain_code(&resources, &user, &params).await;

    // wrong secret
    let err = resources
        .oauth_provider
        .token(
            ClientCredentials {
                client_id: client.client_id.clone(),
                client_secret: Some("ayb_cs_wrong".into()),
            },
            token_request(&code, VERIFIER),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // revoked client is told so
    resources
        .database
        .revoke_oauth_client(&client.client_id, user.id)
        .await
        .unwrap();
    let err = resources
        .oauth_provider
        .token(
            credentials(&client, secret.as_ref()),
            token_request(&code, VERIFIER),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");
    assert!(err.error_description.unwrap().contains("revoked"));
}

#[tokio::test]
async fn unknown_grant_type_is_unsupported() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (_user, client, secret) = setup_client(&resources, "confidential", &["readonly"]).await;

    let request = TokenRequest {
        grant_type: Some("password".into()),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: None,
        client_secret: None,
        scope: None,
        refresh_token: None,
    };
    let err = resources
        .oauth_provider
        .token(credentials(&client, secret.as_ref()), request)
        .await
        .unwrap_err();
    assert_eq!(err.error, "unsupported_grant_type");
}
