// ABOUTME: Integration tests for registration, login, refresh rotation, and account lifecycle
// ABOUTME: Exercises the identity service against an in-memory database

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use ayb_auth_server::errors::ErrorCode;

#[tokio::test]
async fn register_issues_tokens_and_rejects_duplicates() {
    let (resources, _sms, _mailer) = common::test_resources().await;

    let (user, tokens) = resources
        .identity
        .register("alice@example.com", "password123")
        .await
        .unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert!(!tokens.token.is_empty());
    assert!(!tokens.refresh_token.is_empty());
    assert!(!tokens.mfa_required);

    // the signed token round-trips through the validator
    let claims = resources.auth.validate_token(&tokens.token).unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.email, "alice@example.com");

    // exact duplicate
    let err = resources
        .identity
        .register("alice@example.com", "password123")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EmailTaken);

    // case-folded duplicate
    let err = resources
        .identity
        .register("ALICE@example.com", "password123")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::EmailTaken);
}

#[tokio::test]
async fn register_validates_inputs() {
    let (resources, _sms, _mailer) = common::test_resources().await;

    for email in ["", "no-at-sign", "@example.com", "user@nodot"] {
        let err = resources
            .identity
            .register(email, "password123")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput, "email: {email:?}");
    }

    let err = resources
        .identity
        .register("bob@example.com", "short")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn login_is_uniform_for_unknown_email_and_wrong_password() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    resources
        .identity
        .register("carol@example.com", "password123")
        .await
        .unwrap();

    let unknown = resources
        .identity
        .login("nobody@example.com", "password123")
        .await
        .unwrap_err();
    let wrong = resources
        .identity
        .login("carol@example.com", "wrong-password")
        .await
        .unwrap_err();

    assert_eq!(unknown.code, ErrorCode::InvalidCredentials);
    assert_eq!(wrong.code, ErrorCode::InvalidCredentials);
    assert_eq!(unknown.message, wrong.message);

    // case-folded lookup succeeds
    let (user, _tokens) = resources
        .identity
        .login("CAROL@example.com", "password123")
        .await
        .unwrap();
    assert_eq!(user.email, "carol@example.com");
}

#[tokio::test]
async fn refresh_rotates_in_place_and_old_token_dies() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (_user, tokens) = resources
        .identity
        .register("dave@example.com", "password123")
        .await
        .unwrap();

    let (_user, rotated) = resources.identity.refresh(&tokens.refresh_token).await.unwrap();
    assert_ne!(rotated.token, tokens.token);
    assert_ne!(rotated.refresh_token, tokens.refresh_token);

    // replaying the old refresh token fails
    let err = resources
        .identity
        .refresh(&tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRefreshToken);

    // the rotated token works exactly once more
    let (_user, second) = resources.identity.refresh(&rotated.refresh_token).await.unwrap();
    let err = resources
        .identity
        .refresh(&rotated.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRefreshToken);
    assert!(!second.refresh_token.is_empty());
}

#[tokio::test]
async fn concurrent_refresh_produces_exactly_one_winner() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (_user, tokens) = resources
        .identity
        .register("eve@example.com", "password123")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let identity = resources.identity.clone();
        let refresh_token = tokens.refresh_token.clone();
        handles.push(tokio::spawn(async move {
            identity.refresh(&refresh_token).await
        }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok((_user, rotated)) => winners.push(rotated),
            Err(err) => {
                assert_eq!(err.code, ErrorCode::InvalidRefreshToken);
                losers += 1;
            }
        }
    }
    assert_eq!(winners.len(), 1, "exactly one concurrent refresh may win");
    assert_eq!(losers, 7);

    // the winner's token works on exactly one subsequent refresh
    let rotated = &winners[0];
    resources.identity.refresh(&rotated.refresh_token).await.unwrap();
    let err = resources
        .identity
        .refresh(&rotated.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRefreshToken);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (_user, tokens) = resources
        .identity
        .register("frank@example.com", "password123")
        .await
        .unwrap();

    resources.identity.logout(&tokens.refresh_token).await.unwrap();
    // logging out again is a no-op
    resources.identity.logout(&tokens.refresh_token).await.unwrap();

    let err = resources
        .identity
        .refresh(&tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRefreshToken);
}

#[tokio::test]
async fn password_reset_revokes_sessions_and_is_single_use() {
    let (resources, _sms, mailer) = common::test_resources().await;
    let (_user, tokens) = resources
        .identity
        .register("grace@example.com", "password123")
        .await
        .unwrap();

    // unknown addresses succeed silently
    resources
        .identity
        .request_password_reset("stranger@example.com")
        .await
        .unwrap();
    assert!(mailer.last_token_for("stranger@example.com").is_none());

    resources
        .identity
        .request_password_reset("grace@example.com")
        .await
        .unwrap();
    // mail send is spawned; give it a moment
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let reset_token = mailer.last_token_for("grace@example.com").unwrap();

    resources
        .identity
        .confirm_password_reset(&reset_token, "new-password-1")
        .await
        .unwrap();

    // all sessions are gone
    let err = resources
        .identity
        .refresh(&tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRefreshToken);

    // the token was consumed atomically
    let err = resources
        .identity
        .confirm_password_reset(&reset_token, "new-password-2")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidResetToken);

    // old password is dead, new one works
    assert!(resources
        .identity
        .login("grace@example.com", "password123")
        .await
        .is_err());
    resources
        .identity
        .login("grace@example.com", "new-password-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn email_verification_round_trip() {
    let (resources, _sms, mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("heidi@example.com", "password123")
        .await
        .unwrap();
    assert!(!user.email_verified);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let token = mailer.last_token_for("heidi@example.com").unwrap();

    resources.identity.verify_email(&token).await.unwrap();
    let user = resources.identity.get_user(user.id).await.unwrap();
    assert!(user.email_verified);

    // single use
    let err = resources.identity.verify_email(&token).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidVerifyToken);
}

#[tokio::test]
async fn magic_link_creates_verified_account() {
    let (resources, _sms, mailer) = common::test_resources().await;

    // malformed addresses are swallowed
    resources.identity.request_magic_link("not-an-email").await.unwrap();
    assert!(mailer.mails().is_empty());

    resources
        .identity
        .request_magic_link("ivan@example.com")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let token = mailer.last_token_for("ivan@example.com").unwrap();

    let (user, tokens) = resources.identity.confirm_magic_link(&token).await.unwrap();
    assert_eq!(user.email, "ivan@example.com");
    assert!(user.email_verified);
    assert!(!tokens.refresh_token.is_empty());

    // single use
    let err = resources.identity.confirm_magic_link(&token).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidMagicLinkToken);

    // signing in again resolves the same account
    resources
        .identity
        .request_magic_link("ivan@example.com")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let token = mailer.last_token_for("ivan@example.com").unwrap();
    let (again, _tokens) = resources.identity.confirm_magic_link(&token).await.unwrap();
    assert_eq!(again.id, user.id);
}

#[tokio::test]
async fn delete_account_cascades_sessions() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, tokens) = resources
        .identity
        .register("judy@example.com", "password123")
        .await
        .unwrap();

    resources.identity.delete_account(user.id).await.unwrap();

    let err = resources
        .identity
        .refresh(&tokens.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRefreshToken);

    // deleting an unknown user is an error
    let err = resources.identity.delete_account(user.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    // the email is free again
    resources
        .identity
        .register("judy@example.com", "password123")
        .await
        .unwrap();
}

#[tokio::test]
async fn secret_rotation_invalidates_access_tokens_but_not_refresh() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (_user, tokens) = resources
        .identity
        .register("kim@example.com", "password123")
        .await
        .unwrap();

    resources.auth.rotate_secret().unwrap();

    assert!(resources.auth.validate_token(&tokens.token).is_err());
    // refresh sessions survive rotation; the new access token validates
    let (_user, rotated) = resources.identity.refresh(&tokens.refresh_token).await.unwrap();
    resources.auth.validate_token(&rotated.token).unwrap();
}
