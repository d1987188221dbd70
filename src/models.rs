// ABOUTME: Persistence models for users, sessions, apps, API keys, MFA, and SMS state
// ABOUTME: OAuth server models live in the oauth2 module alongside their endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human account
#[derive(Debug, Clone)]
pub struct User {
    /// Unique id
    pub id: Uuid,
    /// Normalized (lowercased, trimmed) email; unique case-folded
    pub email: String,
    /// Optional phone in E.164, set by SMS login or MFA enrollment
    pub phone: Option<String>,
    /// Self-describing password hash (argon2id PHC, bcrypt, or tagged legacy)
    pub password_hash: String,
    /// Whether the email (or its phone stand-in) has been verified
    pub email_verified: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a new user record; timestamps start at now
    #[must_use]
    pub fn new(id: Uuid, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            phone: None,
            password_hash,
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public projection of a user, safe to return from handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// User id
    pub id: String,
    /// Email address
    pub email: String,
    /// Phone, when bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Email verification state
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            email_verified: user.email_verified,
        }
    }
}

/// One active first-party refresh token. Only a token whose SHA-256 hash
/// matches an unexpired row is valid; rotation rewrites the row in place so
/// the grant keeps its identity.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique id
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// SHA-256 of the opaque refresh token
    pub token_hash: String,
    /// Expiry; an expired row is dead even before cleanup
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// An administrative grouping carrying optional rate-limit configuration.
/// OAuth clients and API keys may belong to an app; validated credentials
/// inherit the app's limits through claims.
#[derive(Debug, Clone)]
pub struct App {
    /// Unique id
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Requests allowed per window, when limited
    pub rate_limit_rps: Option<i64>,
    /// Window length in seconds, when limited
    pub rate_limit_window_seconds: Option<i64>,
    /// Revocation marker
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// An opaque long-lived credential under a user. The plaintext is shown
/// exactly once at creation; only the hash is stored.
#[derive(Debug, Clone)]
pub struct ApiKey {
    /// Unique id
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// SHA-256 of the plaintext, the lookup key
    pub key_hash: String,
    /// First 12 chars of the plaintext, for display
    pub key_prefix: String,
    /// `*`, `readonly`, or `readwrite`
    pub scope: String,
    /// Table restriction; empty means all tables
    pub allowed_tables: Vec<String>,
    /// Owning app, when attached to one
    pub app_id: Option<Uuid>,
    /// Last successful validation, best-effort
    pub last_used_at: Option<DateTime<Utc>>,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Revocation marker
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// SMS MFA enrollment for a user. `none` is the absence of a row; a row with
/// `enabled = false` is `pending`; confirmation flips it to `enabled`.
#[derive(Debug, Clone)]
pub struct MfaEnrollment {
    /// Owning user
    pub user_id: Uuid,
    /// Enrollment phone in E.164
    pub phone: String,
    /// Whether the enrollment has been confirmed
    pub enabled: bool,
    /// When the enrollment was confirmed
    pub enrolled_at: Option<DateTime<Utc>>,
    /// When the enrollment row was created
    pub created_at: DateTime<Utc>,
}

/// A pending SMS one-time code. At most one active row per phone.
#[derive(Debug, Clone)]
pub struct SmsCode {
    /// Unique id
    pub id: Uuid,
    /// Destination phone in E.164
    pub phone: String,
    /// bcrypt hash of the numeric code
    pub code_hash: String,
    /// Failed verification attempts so far
    pub attempts: i64,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Per-day SMS counters backing the circuit breaker
#[derive(Debug, Clone, Default)]
pub struct SmsDailyStats {
    /// Codes issued today
    pub count: i64,
    /// Successful verifications today
    pub confirm_count: i64,
    /// Failed verifications today
    pub fail_count: i64,
}
