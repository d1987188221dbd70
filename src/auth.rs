// ABOUTME: Signed access-token management with in-place secret rotation
// ABOUTME: Issues and validates HS256 tokens, including restricted MFA pending tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Signed Tokens
//!
//! Access tokens are HS256-signed claims over a single symmetric secret.
//! The secret is the only process-wide mutable configuration; it lives
//! behind a reader-writer lock so that concurrent validators always observe
//! a consistent value, and [`AuthManager::rotate_secret`] atomically replaces
//! it, invalidating every outstanding token.
//!
//! An MFA pending token is the same format with `mfa_pending: true` and a
//! short expiry; it grants access only to the MFA challenge and verify
//! endpoints.

use crate::constants::durations;
use crate::credentials::Claims;
use crate::crypto;
use crate::models::User;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Signed-token validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenValidationError {
    /// Token signature is valid but the token has expired
    #[error("token expired")]
    Expired,
    /// Signature, format, or claim content is invalid
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Claims carried inside a signed token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTokenClaims {
    /// User id
    pub sub: String,
    /// User email
    pub email: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// 128-bit random token id
    pub jti: String,
    /// Scope inherited from an API-key-style grant, when present
    #[serde(rename = "apiKeyScope", skip_serializing_if = "Option::is_none")]
    pub api_key_scope: Option<String>,
    /// Table restriction, when present
    #[serde(rename = "allowedTables", skip_serializing_if = "Option::is_none")]
    pub allowed_tables: Option<Vec<String>>,
    /// Owning app, when present
    #[serde(rename = "appId", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// App rate limit, requests per window
    #[serde(rename = "appRateLimitRps", skip_serializing_if = "Option::is_none")]
    pub app_rate_limit_rps: Option<i64>,
    /// App rate limit window in seconds
    #[serde(rename = "appRateLimitWindow", skip_serializing_if = "Option::is_none")]
    pub app_rate_limit_window: Option<i64>,
    /// True only for MFA pending tokens
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mfa_pending: bool,
}

impl SignedTokenClaims {
    /// Collapse into the uniform claims shape
    #[must_use]
    pub fn into_claims(self) -> Claims {
        Claims {
            subject: self.sub,
            email: self.email,
            api_key_scope: self.api_key_scope.unwrap_or_default(),
            allowed_tables: self.allowed_tables.unwrap_or_default(),
            app_id: self.app_id,
            app_rate_limit_rps: self.app_rate_limit_rps,
            app_rate_limit_window_seconds: self.app_rate_limit_window,
            mfa_pending: self.mfa_pending,
        }
    }
}

/// Manager for signed tokens and the rotatable signing secret
pub struct AuthManager {
    secret: RwLock<Vec<u8>>,
    token_expiry_hours: i64,
}

impl AuthManager {
    /// Create a new manager with the given signing secret
    #[must_use]
    pub fn new(secret: Vec<u8>, token_expiry_hours: i64) -> Self {
        Self {
            secret: RwLock::new(secret),
            token_expiry_hours,
        }
    }

    /// Generate a signed access token for a user
    pub fn generate_token(&self, user: &User) -> Result<String> {
        self.sign(SignedTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(self.token_expiry_hours)).timestamp(),
            jti: crypto::random_hex(32),
            api_key_scope: None,
            allowed_tables: None,
            app_id: None,
            app_rate_limit_rps: None,
            app_rate_limit_window: None,
            mfa_pending: false,
        })
    }

    /// Generate an MFA pending token: short-lived, accepted only by the MFA
    /// challenge and verify endpoints
    pub fn generate_pending_token(&self, user: &User) -> Result<String> {
        self.sign(SignedTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(durations::MFA_PENDING_MINUTES)).timestamp(),
            jti: crypto::random_hex(32),
            api_key_scope: None,
            allowed_tables: None,
            app_id: None,
            app_rate_limit_rps: None,
            app_rate_limit_window: None,
            mfa_pending: true,
        })
    }

    fn sign(&self, claims: SignedTokenClaims) -> Result<String> {
        let secret = self
            .secret
            .read()
            .map_err(|_| anyhow::anyhow!("signing secret lock poisoned"))?;
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&secret),
        )
        .context("failed to sign token")
    }

    /// Validate a signed token and extract its claims
    pub fn validate_token(&self, token: &str) -> Result<SignedTokenClaims, TokenValidationError> {
        let secret = self
            .secret
            .read()
            .map_err(|_| TokenValidationError::Invalid("signing secret lock poisoned".into()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<SignedTokenClaims>(token, &DecodingKey::from_secret(&secret), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenValidationError::Expired,
                _ => TokenValidationError::Invalid(e.to_string()),
            })
    }

    /// Rotate the signing secret in place: 32 random bytes, hex-encoded,
    /// atomically replacing the previous value. Every outstanding signed
    /// token becomes invalid.
    pub fn rotate_secret(&self) -> Result<()> {
        let next = generate_jwt_secret();
        let mut secret = self
            .secret
            .write()
            .map_err(|_| anyhow::anyhow!("signing secret lock poisoned"))?;
        *secret = next.into_bytes();
        tracing::info!("signed-token secret rotated, outstanding access tokens invalidated");
        Ok(())
    }
}

/// Generate a fresh signing secret: 32 random bytes, hex-encoded
#[must_use]
pub fn generate_jwt_secret() -> String {
    crypto::random_hex(64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_user() -> User {
        User::new(Uuid::new_v4(), "alice@example.com".into(), "$argon2id$x".into())
    }

    fn manager() -> AuthManager {
        AuthManager::new(generate_jwt_secret().into_bytes(), 24)
    }

    #[test]
    fn token_round_trips() {
        let auth = manager();
        let user = test_user();
        let token = auth.generate_token(&user).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, "alice@example.com");
        assert!(!claims.mfa_pending);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn pending_token_is_flagged_and_short_lived() {
        let auth = manager();
        let token = auth.generate_pending_token(&test_user()).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert!(claims.mfa_pending);
        assert!(claims.exp <= (Utc::now() + Duration::minutes(6)).timestamp());
    }

    #[test]
    fn rotation_invalidates_outstanding_tokens() {
        let auth = manager();
        let token = auth.generate_token(&test_user()).unwrap();
        assert!(auth.validate_token(&token).is_ok());

        auth.rotate_secret().unwrap();
        assert!(matches!(
            auth.validate_token(&token),
            Err(TokenValidationError::Invalid(_))
        ));
    }

    #[test]
    fn tokens_past_their_lifetime_report_expired() {
        // negative lifetime puts exp well past any validation leeway
        let auth = AuthManager::new(generate_jwt_secret().into_bytes(), -2);
        let token = auth.generate_token(&test_user()).unwrap();
        assert!(matches!(
            auth.validate_token(&token),
            Err(TokenValidationError::Expired)
        ));
    }

    #[test]
    fn garbage_is_invalid_not_expired() {
        let auth = manager();
        assert!(matches!(
            auth.validate_token("not.a.token"),
            Err(TokenValidationError::Invalid(_))
        ));
    }
}
