// ABOUTME: SMS OTP service: issuance with a daily circuit breaker, shared verification
// ABOUTME: Invalid or disallowed phones are swallowed silently to prevent enumeration

use crate::config::ServerConfig;
use crate::database::Database;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::external::sms_provider::SmsProvider;
use crate::models::{SmsCode, User};
use crate::phone::{country_allowed, normalize_e164};
use crate::services::identity::{IdentityService, IssuedTokens};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

/// What the code is for; selects the message wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsPurpose {
    /// Passwordless login / phone verification
    Login,
    /// MFA challenge or enrollment confirmation
    Mfa,
}

impl SmsPurpose {
    fn render(self, code: &str) -> String {
        match self {
            Self::Login => format!("Your verification code is {code}"),
            Self::Mfa => format!("Your MFA code is {code}"),
        }
    }
}

/// SMS OTP service
pub struct SmsService {
    database: Arc<Database>,
    provider: Arc<dyn SmsProvider>,
    identity: Arc<IdentityService>,
    config: Arc<ServerConfig>,
}

impl SmsService {
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        provider: Arc<dyn SmsProvider>,
        identity: Arc<IdentityService>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            database,
            provider,
            identity,
            config,
        }
    }

    /// Issue a code to a phone number.
    ///
    /// Invalid phone shapes and disallowed countries return success without
    /// any side effect, so the endpoint cannot be used to probe numbers.
    /// Test phones store their predetermined code but never reach the
    /// provider and never count against the daily limit.
    pub async fn request_code(&self, raw_phone: &str, purpose: SmsPurpose) -> AppResult<()> {
        let Some(phone) = normalize_e164(raw_phone) else {
            tracing::debug!("ignoring SMS request for unparseable phone");
            return Ok(());
        };
        if !country_allowed(&phone, &self.config.sms.allowed_countries) {
            tracing::debug!(%phone, "ignoring SMS request for disallowed country");
            return Ok(());
        }

        if let Some(preset) = self.config.sms.test_phones.get(&phone) {
            self.database.delete_sms_codes_for_phone(&phone).await?;
            self.store_code(&phone, preset).await?;
            tracing::debug!(%phone, "stored test-phone code");
            return Ok(());
        }

        let limit = self.config.sms.daily_limit;
        if limit > 0 {
            let today = self
                .database
                .get_sms_daily_stats(Utc::now().date_naive())
                .await?;
            if today.count >= limit {
                return Err(AppError::new(
                    ErrorCode::DailyLimitExceeded,
                    ErrorCode::DailyLimitExceeded.description(),
                ));
            }
        }

        self.database.delete_sms_codes_for_phone(&phone).await?;

        let code = generate_numeric_code(self.config.sms.code_length);
        self.store_code(&phone, &code).await?;

        self.provider
            .send(&phone, &purpose.render(&code))
            .await
            .map_err(|e| AppError::internal(format!("sms send failed: {e}")))?;

        self.database
            .increment_sms_daily_count(Utc::now().date_naive())
            .await?;

        tracing::info!(%phone, "issued SMS code");
        Ok(())
    }

    async fn store_code(&self, phone: &str, code: &str) -> AppResult<()> {
        let code_hash = bcrypt::hash(code, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::internal(format!("code hashing failed: {e}")))?;
        self.database
            .insert_sms_code(&SmsCode {
                id: Uuid::new_v4(),
                phone: phone.to_owned(),
                code_hash,
                attempts: 0,
                expires_at: Utc::now() + Duration::minutes(self.config.sms.code_expiry_minutes),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Shared OTP validator used by SMS login, MFA enrollment, and MFA
    /// verification.
    ///
    /// A wrong code burns one attempt; hitting the attempt budget destroys
    /// the code. A correct code is consumed atomically, so two concurrent
    /// confirms cannot both win.
    pub async fn verify_code(&self, phone: &str, code: &str) -> AppResult<()> {
        let max_attempts = self.config.sms.max_attempts;
        let Some(row) = self.database.get_active_sms_code(phone, max_attempts).await? else {
            self.database.delete_sms_codes_for_phone(phone).await?;
            return Err(invalid_code());
        };

        let matches = bcrypt::verify(code, &row.code_hash)
            .map_err(|e| AppError::internal(format!("code verification failed: {e}")))?;

        if !matches {
            let attempts = self.database.increment_sms_attempts(row.id).await?;
            if attempts >= max_attempts {
                self.database.delete_sms_code(row.id).await?;
                tracing::info!(phone = %row.phone, "SMS code destroyed after too many attempts");
            }
            self.database
                .increment_sms_daily_failures(Utc::now().date_naive())
                .await?;
            return Err(invalid_code());
        }

        if !self.database.consume_sms_code(row.id).await? {
            return Err(invalid_code());
        }
        self.database
            .increment_sms_daily_confirms(Utc::now().date_naive())
            .await?;
        Ok(())
    }

    /// SMS-first login: verify the code, then find or create the account.
    /// MFA-enabled accounts still get only a pending token here.
    pub async fn confirm_login(
        &self,
        raw_phone: &str,
        code: &str,
    ) -> AppResult<(User, IssuedTokens)> {
        let phone = normalize_e164(raw_phone).ok_or_else(invalid_code)?;
        self.verify_code(&phone, code).await?;

        let user = self.identity.find_or_create_by_phone(&phone).await?;
        let tokens = self.identity.issue_tokens(&user).await?;
        Ok((user, tokens))
    }
}

fn invalid_code() -> AppError {
    AppError::new(
        ErrorCode::InvalidSmsCode,
        ErrorCode::InvalidSmsCode.description(),
    )
}

/// Uniformly random numeric code of the given length, left-padded with
/// zeros
fn generate_numeric_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_have_requested_length() {
        for len in [4, 6, 8] {
            let code = generate_numeric_code(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn purpose_selects_message_prefix() {
        assert_eq!(
            SmsPurpose::Login.render("123456"),
            "Your verification code is 123456"
        );
        assert_eq!(SmsPurpose::Mfa.render("123456"), "Your MFA code is 123456");
    }
}
