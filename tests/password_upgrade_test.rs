// ABOUTME: Integration tests for multi-format password verification and progressive upgrade
// ABOUTME: Legacy bcrypt and scrypt hashes verify on login and are rehashed to argon2id

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use ayb_auth_server::errors::ErrorCode;
use ayb_auth_server::password;
use std::time::Duration;

/// Poll until the stored hash becomes argon2id; the upgrade runs off the
/// login path
async fn wait_for_upgrade(
    resources: &ayb_auth_server::resources::ServerResources,
    user_id: uuid::Uuid,
) -> String {
    for _ in 0..100 {
        let user = resources.identity.get_user(user_id).await.unwrap();
        if user.password_hash.starts_with("$argon2id$") {
            return user.password_hash;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("password hash was not upgraded to argon2id");
}

#[tokio::test]
async fn bcrypt_login_upgrades_to_argon2id() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("legacy-bcrypt@example.com", "password123")
        .await
        .unwrap();

    // simulate an account imported with a bcrypt hash
    let bcrypt_hash = password::hash_password_bcrypt("imported-pass", 4).unwrap();
    resources
        .database
        .update_password_hash(user.id, &bcrypt_hash)
        .await
        .unwrap();

    resources
        .identity
        .login("legacy-bcrypt@example.com", "imported-pass")
        .await
        .unwrap();

    let upgraded = wait_for_upgrade(&resources, user.id).await;
    assert!(password::verify_password("imported-pass", &upgraded).unwrap());

    // the same password still logs in after the upgrade
    resources
        .identity
        .login("legacy-bcrypt@example.com", "imported-pass")
        .await
        .unwrap();
}

#[tokio::test]
async fn legacy_scrypt_login_upgrades_to_argon2id() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("legacy-scrypt@example.com", "password123")
        .await
        .unwrap();

    let scrypt_hash = password::hash_legacy_scrypt("scrypt-pass").unwrap();
    resources
        .database
        .update_password_hash(user.id, &scrypt_hash)
        .await
        .unwrap();

    // wrong password against the legacy hash still fails cleanly
    let err = resources
        .identity
        .login("legacy-scrypt@example.com", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidCredentials);

    resources
        .identity
        .login("legacy-scrypt@example.com", "scrypt-pass")
        .await
        .unwrap();

    let upgraded = wait_for_upgrade(&resources, user.id).await;
    assert!(password::verify_password("scrypt-pass", &upgraded).unwrap());
}

#[tokio::test]
async fn argon2id_login_keeps_its_hash() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("native@example.com", "password123")
        .await
        .unwrap();
    let original = resources
        .identity
        .get_user(user.id)
        .await
        .unwrap()
        .password_hash;
    assert!(original.starts_with("$argon2id$"));

    resources
        .identity
        .login("native@example.com", "password123")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = resources
        .identity
        .get_user(user.id)
        .await
        .unwrap()
        .password_hash;
    assert_eq!(original, after, "argon2id hashes are not rewritten on login");
}

#[tokio::test]
async fn unsupported_hash_format_is_an_internal_error_not_a_credential_error() {
    let (resources, _sms, _mailer) = common::test_resources().await;
    let (user, _tokens) = resources
        .identity
        .register("mystery@example.com", "password123")
        .await
        .unwrap();

    resources
        .database
        .update_password_hash(user.id, "$pbkdf2$unsupported")
        .await
        .unwrap();

    let err = resources
        .identity
        .login("mystery@example.com", "password123")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
}
