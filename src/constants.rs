// ABOUTME: Application constants shared across the auth service
// ABOUTME: Credential prefixes, token durations, and protocol limits
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

/// Bearer-credential prefixes. Wire-exact: downstream tooling pattern-matches
/// on these strings, so they are never reformatted.
pub mod key_prefixes {
    /// Opaque API key: `ayb_` + 48 lowercase hex chars (52 total)
    pub const API_KEY: &str = "ayb_";
    /// OAuth access token: `ayb_at_` + 64 lowercase hex chars
    pub const OAUTH_ACCESS_TOKEN: &str = "ayb_at_";
    /// OAuth refresh token: `ayb_rt_` + 96 lowercase hex chars
    pub const OAUTH_REFRESH_TOKEN: &str = "ayb_rt_";
    /// OAuth client id: `ayb_cid_` + 48 lowercase hex chars
    pub const OAUTH_CLIENT_ID: &str = "ayb_cid_";
    /// OAuth client secret: `ayb_cs_` + 64 lowercase hex chars
    pub const OAUTH_CLIENT_SECRET: &str = "ayb_cs_";
}

/// Hex-character counts following each credential prefix
pub mod key_lengths {
    pub const API_KEY_HEX: usize = 48;
    pub const OAUTH_ACCESS_TOKEN_HEX: usize = 64;
    pub const OAUTH_REFRESH_TOKEN_HEX: usize = 96;
    pub const OAUTH_CLIENT_ID_HEX: usize = 48;
    pub const OAUTH_CLIENT_SECRET_HEX: usize = 64;
    /// Display prefix stored alongside API keys (first 12 chars of plaintext)
    pub const API_KEY_DISPLAY_PREFIX: usize = 12;
}

/// Token and session lifetimes
pub mod durations {
    /// Signed access-token lifetime in hours
    pub const ACCESS_TOKEN_HOURS: i64 = 24;
    /// First-party refresh session lifetime in days
    pub const REFRESH_SESSION_DAYS: i64 = 30;
    /// MFA pending-token lifetime in minutes
    pub const MFA_PENDING_MINUTES: i64 = 5;
    /// OAuth authorization-code lifetime in minutes
    pub const AUTH_CODE_MINUTES: i64 = 10;
    /// OAuth access-token lifetime in seconds
    pub const OAUTH_ACCESS_TOKEN_SECS: i64 = 3600;
    /// OAuth refresh-token lifetime in days
    pub const OAUTH_REFRESH_TOKEN_DAYS: i64 = 30;
    /// One-time token (reset, verify, magic link) lifetime in minutes
    pub const ONE_TIME_TOKEN_MINUTES: i64 = 60;
    /// Outbound OAuth consumer state lifetime in minutes
    pub const OAUTH_STATE_MINUTES: i64 = 10;
}

/// Input validation limits
pub mod limits {
    /// Default minimum password length
    pub const MIN_PASSWORD_LENGTH: usize = 8;
    /// Default SMS code length in digits
    pub const SMS_CODE_LENGTH: usize = 6;
    /// Default SMS verification attempts before the code is destroyed
    pub const SMS_MAX_ATTEMPTS: i64 = 3;
    /// Default SMS code lifetime in minutes
    pub const SMS_CODE_MINUTES: i64 = 5;
    /// PKCE code verifier length bounds (RFC 7636 section 4.1)
    pub const PKCE_VERIFIER_MIN: usize = 43;
    pub const PKCE_VERIFIER_MAX: usize = 128;
}

/// Outbound HTTP timeouts
pub mod timeouts {
    /// Total timeout for OAuth consumer token/userinfo exchanges, in seconds
    pub const OAUTH_EXCHANGE_SECS: u64 = 10;
}

/// Synthetic email domain for accounts created through SMS-first login
pub const SMS_LOCAL_DOMAIN: &str = "sms.local";

/// Service name used in logs and mail templates
pub const SERVICE_NAME: &str = "ayb-auth-server";
