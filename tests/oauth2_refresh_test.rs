// ABOUTME: Integration tests for OAuth refresh rotation, replay detection, and revocation
// ABOUTME: A replayed refresh token revokes every token sharing its grant

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use ayb_auth_server::models::App;
use ayb_auth_server::oauth2::clients::{ClientCredentials, RegisterClientRequest};
use ayb_auth_server::oauth2::models::{AuthorizeParams, TokenRequest, TokenResponse};
use ayb_auth_server::oauth2::provider::generate_pkce_challenge;
use ayb_auth_server::resources::ServerResources;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const REDIRECT: &str = "https://rp.example.com/cb";

struct Fixture {
    resources: Arc<ServerResources>,
    credentials: ClientCredentials,
    seed: TokenResponse,
}

impl Fixture {
    async fn new() -> Self {
        let (resources, _sms, _mailer) = common::test_resources().await;

        let (user, _tokens) = resources
            .identity
            .register("rp-owner@example.com", "password123")
            .await
            .unwrap();
        let app = App {
            id: Uuid::new_v4(),
            user_id: user.id,
            name: "rp app".into(),
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
                    name: "rp".into(),
                    redirect_uris: vec![REDIRECT.into()],
                    scopes: vec!["readwrite".into()],
                    client_type: None,
                },
            )
            .await
            .unwrap();

        let credentials = ClientCredentials {
            client_id: client.client_id,
            client_secret: secret,
        };

        // seed one grant
        let params = AuthorizeParams {
            response_type: Some("code".into()),
            client_id: Some(credentials.client_id.clone()),
            redirect_uri: Some(REDIRECT.into()),
            scope: Some("readwrite".into()),
            state: Some("st".into()),
            code_challenge: Some(generate_pkce_challenge(VERIFIER)),
            code_challenge_method: Some("S256".into()),
            allowed_tables: None,
        };
        let url = resources
            .oauth_provider
            .consent(user.id, "approve", &params)
            .await
            .unwrap();
        let code = url::Url::parse(&url)
            .unwrap()
            .query_pairs()
            .find(|(name, _)| name == "code")
            .map(|(_, value)| value.into_owned())
            .unwrap();

        let exchange = TokenRequest {
            grant_type: Some("authorization_code".into()),
            code: Some(code),
            redirect_uri: Some(REDIRECT.into()),
            code_verifier: Some(VERIFIER.into()),
            client_id: None,
            client_secret: None,
            scope: None,
            refresh_token: None,
        };
        let seed = resources
            .oauth_provider
            .token(credentials.clone(), exchange)
            .await
            .unwrap();

        Self {
            resources,
            credentials,
            seed,
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ayb_auth_server::oauth2::models::OAuthError> {
        self.resources
            .oauth_provider
            .token(
                self.credentials.clone(),
                TokenRequest {
                    grant_type: Some("refresh_token".into()),
                    refresh_token: Some(refresh_token.into()),
                    code: None,
                    redirect_uri: None,
                    code_verifier: None,
                    client_id: None,
                    client_secret: None,
                    scope: None,
                },
            )
            .await
    }

    async fn access_token_is_live(&self, access_token: &str) -> bool {
        self.resources
            .oauth_provider
            .validate_access_token(access_token)
            .await
            .unwrap()
            .is_some()
    }
}

#[tokio::test]
async fn rotation_issues_a_new_pair_and_replay_sweeps_the_grant() {
    let fixture = Fixture::new().await;
    let seed = &fixture.seed;
    let original_refresh = seed.refresh_token.clone().unwrap();

    // first rotation succeeds
    let rotated = fixture.refresh(&original_refresh).await.unwrap();
    let rotated_refresh = rotated.refresh_token.clone().unwrap();
    assert_ne!(rotated_refresh, original_refresh);
    assert!(fixture.access_token_is_live(&rotated.access_token).await);

    // replaying the rotated-away token is theft: the whole grant dies
    let err = fixture.refresh(&original_refresh).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    assert!(err.error_description.unwrap().contains("token theft"));

    // the access token minted by the successful rotation is dead too
    assert!(!fixture.access_token_is_live(&rotated.access_token).await);
    // and so is the rotated refresh token
    let err = fixture.refresh(&rotated_refresh).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn revoking_a_refresh_token_kills_every_sibling() {
    let fixture = Fixture::new().await;
    let seed = &fixture.seed;
    let refresh_token = seed.refresh_token.clone().unwrap();

    assert!(fixture.access_token_is_live(&seed.access_token).await);
    fixture
        .resources
        .oauth_provider
        .revoke(&refresh_token)
        .await
        .unwrap();

    assert!(!fixture.access_token_is_live(&seed.access_token).await);
    let err = fixture.refresh(&refresh_token).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn revoking_an_access_token_leaves_the_refresh_token_alone() {
    let fixture = Fixture::new().await;
    let seed = &fixture.seed;
    let refresh_token = seed.refresh_token.clone().unwrap();

    fixture
        .resources
        .oauth_provider
        .revoke(&seed.access_token)
        .await
        .unwrap();
    assert!(!fixture.access_token_is_live(&seed.access_token).await);

    // the refresh token still rotates
    fixture.refresh(&refresh_token).await.unwrap();
}

#[tokio::test]
async fn revoking_an_unknown_token_succeeds_silently() {
    let fixture = Fixture::new().await;
    fixture
        .resources
        .oauth_provider
        .revoke("ayb_rt_definitely_not_issued")
        .await
        .unwrap();
}
