// ABOUTME: Integration tests for the SMS OTP subsystem: issuance, breaker, confirmation
// ABOUTME: Covers anti-enumeration swallowing, test phones, and attempt budgets

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use ayb_auth_server::errors::ErrorCode;
use ayb_auth_server::services::SmsPurpose;

const US_PHONE_1: &str = "+14155552671";
const US_PHONE_2: &str = "+14155552672";
const US_PHONE_3: &str = "+14155552673";
const GB_PHONE: &str = "+442079460958";

#[tokio::test]
async fn daily_circuit_breaker_and_country_allow_list() {
    let (resources, sms, _mailer) = common::test_resources_with(|config| {
        config.sms.allowed_countries = vec!["US".into(), "CA".into()];
        config.sms.daily_limit = 2;
    })
    .await;

    // two issuances fit the budget
    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    resources
        .sms
        .request_code(US_PHONE_2, SmsPurpose::Login)
        .await
        .unwrap();
    assert_eq!(sms.messages().len(), 2);

    // the third trips the breaker
    let err = resources
        .sms
        .request_code(US_PHONE_3, SmsPurpose::Login)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DailyLimitExceeded);
    assert_eq!(sms.messages().len(), 2);

    // a blocked country is swallowed silently: no send, no code row
    let (resources, sms, _mailer) = common::test_resources_with(|config| {
        config.sms.allowed_countries = vec!["US".into(), "CA".into()];
    })
    .await;
    resources
        .sms
        .request_code(GB_PHONE, SmsPurpose::Login)
        .await
        .unwrap();
    assert!(sms.messages().is_empty());
    let err = resources
        .sms
        .confirm_login(GB_PHONE, "000000")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSmsCode);
}

#[tokio::test]
async fn malformed_phones_are_swallowed_silently() {
    let (resources, sms, _mailer) = common::test_resources().await;

    for phone in ["4155552671", "+0415", "not-a-phone"] {
        resources
            .sms
            .request_code(phone, SmsPurpose::Login)
            .await
            .unwrap();
    }
    assert!(sms.messages().is_empty());
}

#[tokio::test]
async fn test_phones_bypass_provider_and_daily_counter() {
    let (resources, sms, _mailer) = common::test_resources_with(|config| {
        config.sms.daily_limit = 1;
        config
            .sms
            .test_phones
            .insert("+15551230001".into(), "424242".into());
    })
    .await;

    // the test phone stores its predetermined code without touching the
    // provider or the counter
    resources
        .sms
        .request_code("+15551230001", SmsPurpose::Login)
        .await
        .unwrap();
    assert!(sms.messages().is_empty());

    let (user, tokens) = resources
        .sms
        .confirm_login("+15551230001", "424242")
        .await
        .unwrap();
    assert_eq!(user.email, "+15551230001@sms.local");
    assert!(!tokens.refresh_token.is_empty());

    // the daily budget of one is still fully available
    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
}

#[tokio::test]
async fn sms_first_login_creates_and_reuses_the_account() {
    let (resources, sms, _mailer) = common::test_resources().await;

    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    let code = sms.last_code_for(US_PHONE_1).unwrap();
    assert_eq!(code.len(), 6);

    let (user, tokens) = resources.sms.confirm_login(US_PHONE_1, &code).await.unwrap();
    assert_eq!(user.phone.as_deref(), Some(US_PHONE_1));
    assert_eq!(user.email, format!("{US_PHONE_1}@sms.local"));
    assert!(user.email_verified);
    assert!(!tokens.refresh_token.is_empty());

    // the code was consumed atomically
    let err = resources
        .sms
        .confirm_login(US_PHONE_1, &code)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSmsCode);

    // next login resolves the same account
    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    let code = sms.last_code_for(US_PHONE_1).unwrap();
    let (again, _tokens) = resources.sms.confirm_login(US_PHONE_1, &code).await.unwrap();
    assert_eq!(again.id, user.id);
}

#[tokio::test]
async fn wrong_codes_burn_attempts_until_the_code_is_destroyed() {
    let (resources, sms, _mailer) = common::test_resources().await;

    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    let real_code = sms.last_code_for(US_PHONE_1).unwrap();
    let wrong_code = if real_code == "000000" { "111111" } else { "000000" };

    for _ in 0..3 {
        let err = resources
            .sms
            .confirm_login(US_PHONE_1, wrong_code)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSmsCode);
    }

    // after the attempt budget, even the real code is dead
    let err = resources
        .sms
        .confirm_login(US_PHONE_1, &real_code)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSmsCode);
}

#[tokio::test]
async fn new_issuance_replaces_the_previous_code() {
    let (resources, sms, _mailer) = common::test_resources().await;

    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    let first = sms.last_code_for(US_PHONE_1).unwrap();

    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    let second = sms.last_code_for(US_PHONE_1).unwrap();

    if first != second {
        let err = resources
            .sms
            .confirm_login(US_PHONE_1, &first)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSmsCode);
    }
    resources.sms.confirm_login(US_PHONE_1, &second).await.unwrap();
}

#[tokio::test]
async fn daily_stats_track_confirms_and_failures() {
    let (resources, sms, _mailer) = common::test_resources().await;

    resources
        .sms
        .request_code(US_PHONE_1, SmsPurpose::Login)
        .await
        .unwrap();
    let code = sms.last_code_for(US_PHONE_1).unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let _ = resources.sms.confirm_login(US_PHONE_1, wrong).await;
    resources.sms.confirm_login(US_PHONE_1, &code).await.unwrap();

    let stats = resources
        .database
        .get_sms_daily_stats(chrono::Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.fail_count, 1);
    assert_eq!(stats.confirm_count, 1);
}
