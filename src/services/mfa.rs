// ABOUTME: SMS MFA service: enrollment state machine and second-factor verification
// ABOUTME: none -> pending (enroll) -> enabled (confirm); re-enrolling while pending replaces the phone

use crate::database::Database;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::User;
use crate::phone::normalize_e164;
use crate::services::identity::{IdentityService, IssuedTokens};
use crate::services::sms::{SmsPurpose, SmsService};
use std::sync::Arc;
use uuid::Uuid;

/// SMS MFA enrollment and verification service
pub struct MfaService {
    database: Arc<Database>,
    sms: Arc<SmsService>,
    identity: Arc<IdentityService>,
}

impl MfaService {
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        sms: Arc<SmsService>,
        identity: Arc<IdentityService>,
    ) -> Self {
        Self {
            database,
            sms,
            identity,
        }
    }

    /// Start (or restart) an SMS enrollment and send the confirmation code.
    /// Fails once the enrollment is enabled; while still pending, a second
    /// call replaces the phone.
    pub async fn enroll(&self, user_id: Uuid, raw_phone: &str) -> AppResult<()> {
        let phone = normalize_e164(raw_phone)
            .ok_or_else(|| AppError::validation("phone must be a valid E.164 number"))?;

        let enrollment = self.database.get_mfa_enrollment(user_id).await?;
        if enrollment.is_some_and(|e| e.enabled) {
            return Err(AppError::new(
                ErrorCode::MfaAlreadyEnrolled,
                ErrorCode::MfaAlreadyEnrolled.description(),
            ));
        }

        self.database
            .upsert_pending_mfa_enrollment(user_id, &phone)
            .await?;
        self.sms.request_code(&phone, SmsPurpose::Mfa).await?;
        tracing::info!(%user_id, "started SMS MFA enrollment");
        Ok(())
    }

    /// Confirm a pending enrollment with the code sent to the new phone.
    /// Enabling also binds the phone to the user record.
    pub async fn confirm_enrollment(&self, user_id: Uuid, code: &str) -> AppResult<()> {
        let enrollment = self
            .database
            .get_mfa_enrollment(user_id)
            .await?
            .ok_or_else(|| AppError::validation("no SMS MFA enrollment in progress"))?;
        if enrollment.enabled {
            return Err(AppError::new(
                ErrorCode::MfaAlreadyEnrolled,
                ErrorCode::MfaAlreadyEnrolled.description(),
            ));
        }

        self.sms.verify_code(&enrollment.phone, code).await?;

        if !self.database.enable_mfa_enrollment(user_id).await? {
            return Err(AppError::validation("no SMS MFA enrollment in progress"));
        }
        self.database
            .set_user_phone(user_id, &enrollment.phone)
            .await?;
        tracing::info!(%user_id, "SMS MFA enabled");
        Ok(())
    }

    /// Send a challenge code to an enabled enrollment. Reached with a
    /// pending token only.
    pub async fn challenge(&self, user_id: Uuid) -> AppResult<()> {
        let enrollment = self.enabled_enrollment(user_id).await?;
        self.sms
            .request_code(&enrollment, SmsPurpose::Mfa)
            .await?;
        Ok(())
    }

    /// Verify the second factor and mint full credentials. Reached with a
    /// pending token only.
    pub async fn verify(&self, user_id: Uuid, code: &str) -> AppResult<(User, IssuedTokens)> {
        let phone = self.enabled_enrollment(user_id).await?;
        self.sms.verify_code(&phone, code).await?;

        let user = self.identity.get_user(user_id).await?;
        let tokens = self.identity.issue_full_tokens(&user).await?;
        tracing::info!(%user_id, "MFA verification completed");
        Ok((user, tokens))
    }

    async fn enabled_enrollment(&self, user_id: Uuid) -> AppResult<String> {
        let enrollment = self
            .database
            .get_mfa_enrollment(user_id)
            .await?
            .filter(|e| e.enabled)
            .ok_or_else(|| AppError::validation("SMS MFA is not enrolled"))?;
        Ok(enrollment.phone)
    }
}
