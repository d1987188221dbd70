// ABOUTME: Integration tests for the multi-prefix credential router
// ABOUTME: All three bearer families must collapse into the same claims shape

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use ayb_auth_server::credentials;
use ayb_auth_server::errors::ErrorCode;
use ayb_auth_server::middleware::auth::authenticate_bearer;
use ayb_auth_server::models::{ApiKey, App};
use chrono::{Duration, Utc};
use uuid::Uuid;

#[tokio::test]
async fn signed_tokens_produce_claims_with_empty_scope() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, tokens) = resources
        .identity
        .register("sam@example.com", "password123")
        .await
        .unwrap();

    let claims = authenticate_bearer(&resources, &tokens.token).await.unwrap();
    assert_eq!(claims.subject, user.id.to_string());
    assert_eq!(claims.email, "sam@example.com");
    assert_eq!(claims.api_key_scope, "");
    assert!(claims.allowed_tables.is_empty());
    assert!(!claims.mfa_pending);

    // write scope passes for signed tokens (empty scope)
    assert!(credentials::check_write_scope(Some(&claims)));
}

#[tokio::test]
async fn api_keys_produce_claims_with_scope_tables_and_app_limits() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("tess@example.com", "password123")
        .await
        .unwrap();

    let app = App {
        id: Uuid::new_v4(),
        user_id: user.id,
        name: "limited app".into(),
        rate_limit_rps: Some(5),
        rate_limit_window_seconds: Some(60),
        revoked_at: None,
        created_at: Utc::now(),
    };
    resources.database.create_app(&app).await.unwrap();

    let material = credentials::generate_api_key();
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id: user.id,
        name: "ci key".into(),
        key_hash: material.key_hash.clone(),
        key_prefix: material.display_prefix.clone(),
        scope: "readonly".into(),
        allowed_tables: vec!["orders".into()],
        app_id: Some(app.id),
        last_used_at: None,
        expires_at: None,
        revoked_at: None,
        created_at: Utc::now(),
    };
    resources.database.create_api_key(&key).await.unwrap();

    let claims = authenticate_bearer(&resources, &material.plaintext)
        .await
        .unwrap();
    assert_eq!(claims.subject, user.id.to_string());
    assert_eq!(claims.email, "tess@example.com");
    assert_eq!(claims.api_key_scope, "readonly");
    assert_eq!(claims.allowed_tables, vec!["orders".to_owned()]);
    assert_eq!(claims.app_id.as_deref(), Some(app.id.to_string().as_str()));
    assert_eq!(claims.app_rate_limit_rps, Some(5));
    assert_eq!(claims.app_rate_limit_window_seconds, Some(60));

    // scope and table checks fail closed
    assert!(!credentials::check_write_scope(Some(&claims)));
    assert!(credentials::check_table_scope(Some(&claims), "orders"));
    assert!(!credentials::check_table_scope(Some(&claims), "users"));
}

#[tokio::test]
async fn expired_and_revoked_api_keys_are_rejected() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("uma@example.com", "password123")
        .await
        .unwrap();

    let expired = credentials::generate_api_key();
    resources
        .database
        .create_api_key(&ApiKey {
            id: Uuid::new_v4(),
            user_id: user.id,
            name: "expired".into(),
            key_hash: expired.key_hash.clone(),
            key_prefix: expired.display_prefix.clone(),
            scope: "*".into(),
            allowed_tables: Vec::new(),
            app_id: None,
            last_used_at: None,
            expires_at: Some(Utc::now() - Duration::hours(1)),
            revoked_at: None,
            created_at: Utc::now() - Duration::days(2),
        })
        .await
        .unwrap();

    let err = authenticate_bearer(&resources, &expired.plaintext)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);

    let revoked = credentials::generate_api_key();
    let key_id = Uuid::new_v4();
    resources
        .database
        .create_api_key(&ApiKey {
            id: key_id,
            user_id: user.id,
            name: "revoked".into(),
            key_hash: revoked.key_hash.clone(),
            key_prefix: revoked.display_prefix.clone(),
            scope: "*".into(),
            allowed_tables: Vec::new(),
            app_id: None,
            last_used_at: None,
            expires_at: None,
            revoked_at: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    resources
        .database
        .revoke_api_key(key_id, user.id)
        .await
        .unwrap();

    let err = authenticate_bearer(&resources, &revoked.plaintext)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);
}

#[tokio::test]
async fn unknown_credentials_fail_per_family() {
    let (resources, _sms, _mailer) = common::test_resources().await;

    // OAuth prefix routes to the OAuth validator
    let err = authenticate_bearer(&resources, &format!("ayb_at_{}", "0".repeat(64)))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);

    // API key prefix routes to the key validator
    let err = authenticate_bearer(&resources, &format!("ayb_{}", "0".repeat(48)))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);

    // everything else is treated as a signed token
    let err = authenticate_bearer(&resources, "garbage").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthInvalid);
}
