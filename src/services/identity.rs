// ABOUTME: Identity service: registration, login, refresh rotation, and passwordless flows
// ABOUTME: MFA-enabled users are demoted to a pending token until the second factor verifies

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::constants::durations;
use crate::crypto;
use crate::database::Database;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::external::mailer::{
    magic_link_mail, password_reset_mail, verification_mail, Mailer,
};
use crate::models::User;
use crate::password;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Tokens issued for a successful (first-factor) authentication.
///
/// When the user has an enabled SMS MFA enrollment, `token` is a pending
/// token, `refresh_token` is empty, and `mfa_required` is set: the caller
/// must complete the challenge/verify flow to obtain full credentials.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Signed access token, or a pending token under MFA
    pub token: String,
    /// Opaque refresh token; empty under MFA
    pub refresh_token: String,
    /// Whether MFA verification is still required
    pub mfa_required: bool,
}

/// User lifecycle and session service
pub struct IdentityService {
    database: Arc<Database>,
    auth: Arc<AuthManager>,
    mailer: Arc<dyn Mailer>,
    config: Arc<ServerConfig>,
}

impl IdentityService {
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        auth: Arc<AuthManager>,
        mailer: Arc<dyn Mailer>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            database,
            auth,
            mailer,
            config,
        }
    }

    fn validate_email(email: &str) -> AppResult<()> {
        let at = email
            .find('@')
            .ok_or_else(|| AppError::validation("email must contain '@'"))?;
        if at == 0 {
            return Err(AppError::validation("email is missing a local part"));
        }
        let domain = &email[at + 1..];
        if domain.is_empty() || !domain.contains('.') {
            return Err(AppError::validation("email domain is invalid"));
        }
        Ok(())
    }

    fn validate_password(&self, candidate: &str) -> AppResult<()> {
        let min = self.config.auth.min_password_length;
        if candidate.is_empty() {
            return Err(AppError::validation("password must not be empty"));
        }
        if candidate.len() < min {
            return Err(AppError::validation(format!(
                "password must be at least {min} characters"
            )));
        }
        Ok(())
    }

    /// Register a new account and issue first tokens
    pub async fn register(&self, email: &str, candidate: &str) -> AppResult<(User, IssuedTokens)> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::validation("email must not be empty"));
        }
        Self::validate_email(email)?;
        self.validate_password(candidate)?;

        let password_hash =
            password::hash_password(candidate).map_err(|e| AppError::internal(e.to_string()))?;
        let user = User::new(Uuid::new_v4(), email.to_owned(), password_hash);

        if let Err(e) = self.database.create_user(&user).await {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                return Err(AppError::new(
                    ErrorCode::EmailTaken,
                    ErrorCode::EmailTaken.description(),
                ));
            }
            return Err(e.into());
        }

        tracing::info!(user_id = %user.id, "registered user");

        self.send_verification_mail(&user).await;

        let tokens = self.issue_tokens(&user).await?;
        Ok((user, tokens))
    }

    /// Authenticate with email and password.
    ///
    /// The response is identical for unknown emails and wrong passwords. A
    /// successful verification against a legacy hash triggers a best-effort
    /// argon2id rehash off the request path.
    pub async fn login(&self, email: &str, candidate: &str) -> AppResult<(User, IssuedTokens)> {
        let user = self
            .database
            .get_user_by_email(email.trim())
            .await?
            .ok_or_else(AppError::invalid_credentials)?;

        let verified = password::verify_password(candidate, &user.password_hash)
            .map_err(|e| AppError::internal(e.to_string()))?;
        if !verified {
            tracing::debug!(user_id = %user.id, "password verification failed");
            return Err(AppError::invalid_credentials());
        }

        if password::needs_rehash(&user.password_hash) {
            self.spawn_password_upgrade(user.id, candidate.to_owned());
        }

        let tokens = self.issue_tokens(&user).await?;
        Ok((user, tokens))
    }

    fn spawn_password_upgrade(&self, user_id: Uuid, candidate: String) {
        let database = self.database.clone();
        tokio::spawn(async move {
            let rehashed = match password::hash_password(&candidate) {
                Ok(hash) => hash,
                Err(e) => {
                    tracing::warn!(%user_id, "password upgrade hashing failed: {e}");
                    return;
                }
            };
            if let Err(e) = database.update_password_hash(user_id, &rehashed).await {
                tracing::warn!(%user_id, "password upgrade store failed: {e}");
            } else {
                tracing::info!(%user_id, "password hash upgraded to argon2id");
            }
        });
    }

    /// Issue tokens for an authenticated user, demoting to a pending token
    /// when SMS MFA is enabled
    pub async fn issue_tokens(&self, user: &User) -> AppResult<IssuedTokens> {
        let enrollment = self.database.get_mfa_enrollment(user.id).await?;
        if enrollment.is_some_and(|e| e.enabled) {
            let token = self.auth.generate_pending_token(user)?;
            return Ok(IssuedTokens {
                token,
                refresh_token: String::new(),
                mfa_required: true,
            });
        }
        self.issue_full_tokens(user).await
    }

    /// Issue a full access + refresh pair, bypassing the MFA gate. Only the
    /// MFA verify flow and non-MFA logins reach this.
    pub async fn issue_full_tokens(&self, user: &User) -> AppResult<IssuedTokens> {
        let token = self.auth.generate_token(user)?;
        let refresh_token = crypto::random_base64url();
        let expires_at = Utc::now() + Duration::days(self.config.auth.refresh_expiry_days);
        self.database
            .create_session(user.id, &crypto::sha256_hex(&refresh_token), expires_at)
            .await?;
        Ok(IssuedTokens {
            token,
            refresh_token,
            mfa_required: false,
        })
    }

    /// Rotate a refresh token. The session row is rewritten in place under a
    /// guard, so concurrent refreshes of the same token produce exactly one
    /// winner and the old plaintext stops matching immediately.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<(User, IssuedTokens)> {
        let new_token = crypto::random_base64url();
        let expires_at = Utc::now() + Duration::days(self.config.auth.refresh_expiry_days);

        let user_id = self
            .database
            .rotate_session(
                &crypto::sha256_hex(refresh_token),
                &crypto::sha256_hex(&new_token),
                expires_at,
            )
            .await?
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::InvalidRefreshToken,
                    ErrorCode::InvalidRefreshToken.description(),
                )
            })?;

        let user = self
            .database
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::auth_invalid("user no longer exists"))?;

        let token = self.auth.generate_token(&user)?;
        Ok((
            user,
            IssuedTokens {
                token,
                refresh_token: new_token,
                mfa_required: false,
            },
        ))
    }

    /// Invalidate a refresh token. Idempotent.
    pub async fn logout(&self, refresh_token: &str) -> AppResult<()> {
        self.database
            .delete_session_by_hash(&crypto::sha256_hex(refresh_token))
            .await?;
        Ok(())
    }

    /// Load the current user
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        self.database
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }

    /// Delete an account and everything attached to it
    pub async fn delete_account(&self, user_id: Uuid) -> AppResult<()> {
        if self.database.delete_user(user_id).await? {
            tracing::info!(%user_id, "deleted account");
            Ok(())
        } else {
            Err(AppError::not_found("user"))
        }
    }

    // ── Email verification ──────────────────────────────────────────────

    async fn send_verification_mail(&self, user: &User) {
        let token = crypto::random_base64url();
        let expires_at = Utc::now() + Duration::minutes(durations::ONE_TIME_TOKEN_MINUTES);
        if let Err(e) = self
            .database
            .create_email_verification(&crypto::sha256_hex(&token), user.id, expires_at)
            .await
        {
            tracing::warn!(user_id = %user.id, "failed to store verification token: {e}");
            return;
        }

        let mail = verification_mail(&user.email, &self.config.external_url, &token);
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(mail).await {
                tracing::warn!("verification mail send failed: {e}");
            }
        });
    }

    /// Consume a verification token and mark the email verified
    pub async fn verify_email(&self, token: &str) -> AppResult<()> {
        let user_id = self
            .database
            .consume_email_verification(&crypto::sha256_hex(token))
            .await?
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::InvalidVerifyToken,
                    ErrorCode::InvalidVerifyToken.description(),
                )
            })?;
        self.database.set_email_verified(user_id).await?;
        Ok(())
    }

    /// Send a fresh verification mail to an authenticated user
    pub async fn resend_verification(&self, user_id: Uuid) -> AppResult<()> {
        let user = self.get_user(user_id).await?;
        if user.email_verified {
            return Ok(());
        }
        self.send_verification_mail(&user).await;
        Ok(())
    }

    // ── Password reset ──────────────────────────────────────────────────

    /// Request a password reset. Succeeds whether or not the email is known.
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let Some(user) = self.database.get_user_by_email(email.trim()).await? else {
            return Ok(());
        };

        let token = crypto::random_base64url();
        let expires_at = Utc::now() + Duration::minutes(durations::ONE_TIME_TOKEN_MINUTES);
        if let Err(e) = self
            .database
            .create_password_reset(&crypto::sha256_hex(&token), user.id, expires_at)
            .await
        {
            tracing::warn!(user_id = %user.id, "failed to store reset token: {e}");
            return Ok(());
        }

        let mail = password_reset_mail(&user.email, &self.config.external_url, &token);
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(mail).await {
                tracing::warn!("password reset mail send failed: {e}");
            }
        });
        Ok(())
    }

    /// Consume a reset token, set the new password, and drop every session
    pub async fn confirm_password_reset(&self, token: &str, candidate: &str) -> AppResult<()> {
        self.validate_password(candidate)?;

        let user_id = self
            .database
            .consume_password_reset(&crypto::sha256_hex(token))
            .await?
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::InvalidResetToken,
                    ErrorCode::InvalidResetToken.description(),
                )
            })?;

        let password_hash =
            password::hash_password(candidate).map_err(|e| AppError::internal(e.to_string()))?;
        self.database
            .update_password_hash(user_id, &password_hash)
            .await?;
        self.database.delete_sessions_for_user(user_id).await?;
        tracing::info!(%user_id, "password reset completed, sessions revoked");
        Ok(())
    }

    // ── Magic links ─────────────────────────────────────────────────────

    /// Request a sign-in link. Succeeds whether or not the email is known; a
    /// malformed email is swallowed silently.
    pub async fn request_magic_link(&self, email: &str) -> AppResult<()> {
        let email = email.trim();
        if Self::validate_email(email).is_err() {
            return Ok(());
        }

        let token = crypto::random_base64url();
        let expires_at = Utc::now() + Duration::minutes(durations::ONE_TIME_TOKEN_MINUTES);
        if let Err(e) = self
            .database
            .create_magic_link(&crypto::sha256_hex(&token), email, expires_at)
            .await
        {
            tracing::warn!("failed to store magic link token: {e}");
            return Ok(());
        }

        let mail = magic_link_mail(email, &self.config.external_url, &token);
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(mail).await {
                tracing::warn!("magic link mail send failed: {e}");
            }
        });
        Ok(())
    }

    /// Consume a magic link, creating the account on first sign-in. The
    /// email is the verified channel, so new accounts start verified.
    pub async fn confirm_magic_link(&self, token: &str) -> AppResult<(User, IssuedTokens)> {
        let email = self
            .database
            .consume_magic_link(&crypto::sha256_hex(token))
            .await?
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::InvalidMagicLinkToken,
                    ErrorCode::InvalidMagicLinkToken.description(),
                )
            })?;

        let user = self.find_or_create_by_email(&email).await?;
        let tokens = self.issue_tokens(&user).await?;
        Ok((user, tokens))
    }

    /// Load a user by email or create one with an unusable random password
    pub async fn find_or_create_by_email(&self, email: &str) -> AppResult<User> {
        if let Some(user) = self.database.get_user_by_email(email).await? {
            return Ok(user);
        }

        let password_hash = password::hash_password(&crypto::random_hex(32))
            .map_err(|e| AppError::internal(e.to_string()))?;
        let mut user = User::new(Uuid::new_v4(), email.to_owned(), password_hash);
        user.email_verified = true;

        match self.database.create_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "created account from verified channel");
                Ok(user)
            }
            // a concurrent confirm created the row first; load it
            Err(e) if e.as_database_error().is_some_and(|db| db.is_unique_violation()) => self
                .database
                .get_user_by_email(email)
                .await?
                .ok_or_else(|| AppError::internal("user vanished after unique violation")),
            Err(e) => Err(e.into()),
        }
    }

    /// Find-or-create for SMS-first login: the phone is the verified channel
    /// and the synthetic email keeps the unique index satisfied
    pub async fn find_or_create_by_phone(&self, phone: &str) -> AppResult<User> {
        if let Some(user) = self.database.get_user_by_phone(phone).await? {
            return Ok(user);
        }

        let email = format!("{phone}@{}", crate::constants::SMS_LOCAL_DOMAIN);
        let password_hash = password::hash_password(&crypto::random_hex(32))
            .map_err(|e| AppError::internal(e.to_string()))?;
        let mut user = User::new(Uuid::new_v4(), email, password_hash);
        user.phone = Some(phone.to_owned());
        user.email_verified = true;

        match self.database.create_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "created account from SMS login");
                Ok(user)
            }
            Err(e) if e.as_database_error().is_some_and(|db| db.is_unique_violation()) => self
                .database
                .get_user_by_phone(phone)
                .await?
                .ok_or_else(|| AppError::internal("user vanished after unique violation")),
            Err(e) => Err(e.into()),
        }
    }
}
