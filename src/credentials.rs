// ABOUTME: Bearer-credential classification, generation, and the unified claims model
// ABOUTME: Routes a bearer string to exactly one credential family by prefix
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Credential Router & Claims
//!
//! A bearer string belongs to exactly one family, decided by prefix:
//!
//! 1. `ayb_at_` — opaque OAuth access token
//! 2. `ayb_` — opaque API key
//! 3. anything else — signed token
//!
//! The order matters: `ayb_at_` also matches the `ayb_` prefix, so OAuth
//! tokens are tested first. Every validator produces the same [`Claims`]
//! shape; `mfa_pending` and `api_key_scope` are the discriminants downstream
//! code may branch on.

use crate::constants::{key_lengths, key_prefixes};
use crate::crypto;
use serde::{Deserialize, Serialize};

/// API key scope granting full access
pub const SCOPE_ALL: &str = "*";
/// API key scope granting read-only access
pub const SCOPE_READONLY: &str = "readonly";
/// API key scope granting read and write access
pub const SCOPE_READWRITE: &str = "readwrite";

/// Credential family, decided by prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Opaque OAuth access token (`ayb_at_`)
    OAuthAccessToken,
    /// Opaque API key (`ayb_`)
    ApiKey,
    /// HS256 signed token (no recognized prefix)
    SignedToken,
}

/// Classify a bearer string. Infallible: an unrecognized string is a signed
/// token candidate and fails later in the JWT validator.
#[must_use]
pub fn classify(bearer: &str) -> CredentialKind {
    if bearer.starts_with(key_prefixes::OAUTH_ACCESS_TOKEN) {
        CredentialKind::OAuthAccessToken
    } else if bearer.starts_with(key_prefixes::API_KEY) {
        CredentialKind::ApiKey
    } else {
        CredentialKind::SignedToken
    }
}

/// Whether a string carries the API key prefix plus at least one character
#[must_use]
pub fn is_api_key(s: &str) -> bool {
    s.len() > key_prefixes::API_KEY.len() && s.starts_with(key_prefixes::API_KEY)
}

/// Whether a string is exactly an OAuth client id:
/// `ayb_cid_` + 48 lowercase hex chars
#[must_use]
pub fn is_oauth_client_id(s: &str) -> bool {
    match s.strip_prefix(key_prefixes::OAUTH_CLIENT_ID) {
        Some(rest) => {
            rest.len() == key_lengths::OAUTH_CLIENT_ID_HEX
                && rest
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        }
        None => false,
    }
}

/// Generated API key material: the plaintext is shown exactly once
#[derive(Debug, Clone)]
pub struct ApiKeyMaterial {
    /// Full plaintext key, `ayb_` + 48 hex
    pub plaintext: String,
    /// First 12 chars, stored for display
    pub display_prefix: String,
    /// SHA-256 of the plaintext, the storage and lookup key
    pub key_hash: String,
}

/// Generate a new API key
#[must_use]
pub fn generate_api_key() -> ApiKeyMaterial {
    let plaintext = format!(
        "{}{}",
        key_prefixes::API_KEY,
        crypto::random_hex(key_lengths::API_KEY_HEX)
    );
    ApiKeyMaterial {
        display_prefix: plaintext[..key_lengths::API_KEY_DISPLAY_PREFIX].to_owned(),
        key_hash: crypto::sha256_hex(&plaintext),
        plaintext,
    }
}

/// Generate an opaque OAuth access token
#[must_use]
pub fn generate_oauth_access_token() -> String {
    format!(
        "{}{}",
        key_prefixes::OAUTH_ACCESS_TOKEN,
        crypto::random_hex(key_lengths::OAUTH_ACCESS_TOKEN_HEX)
    )
}

/// Generate an opaque OAuth refresh token
#[must_use]
pub fn generate_oauth_refresh_token() -> String {
    format!(
        "{}{}",
        key_prefixes::OAUTH_REFRESH_TOKEN,
        crypto::random_hex(key_lengths::OAUTH_REFRESH_TOKEN_HEX)
    )
}

/// Generate an OAuth client id
#[must_use]
pub fn generate_oauth_client_id() -> String {
    format!(
        "{}{}",
        key_prefixes::OAUTH_CLIENT_ID,
        crypto::random_hex(key_lengths::OAUTH_CLIENT_ID_HEX)
    )
}

/// Generate an OAuth client secret
#[must_use]
pub fn generate_oauth_client_secret() -> String {
    format!(
        "{}{}",
        key_prefixes::OAUTH_CLIENT_SECRET,
        crypto::random_hex(key_lengths::OAUTH_CLIENT_SECRET_HEX)
    )
}

/// Uniform post-validation principal, independent of credential family.
///
/// Attached to the request context by the auth middleware and consulted by
/// rate limiting and table-level authorization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// User id, empty for client-credentials OAuth tokens
    pub subject: String,
    /// User email, empty when no user is bound
    pub email: String,
    /// Scope string for API keys and OAuth tokens; empty for signed tokens
    pub api_key_scope: String,
    /// Table restriction; empty means all tables
    pub allowed_tables: Vec<String>,
    /// Owning app, when the credential belongs to one
    pub app_id: Option<String>,
    /// App-level rate limit, requests per window
    pub app_rate_limit_rps: Option<i64>,
    /// App-level rate limit window in seconds
    pub app_rate_limit_window_seconds: Option<i64>,
    /// True only for MFA pending tokens
    pub mfa_pending: bool,
}

/// Whether a scope string permits reads. Fails closed on unknown scopes.
#[must_use]
pub fn scope_is_read(scope: &str) -> bool {
    matches!(scope, SCOPE_ALL | SCOPE_READONLY | SCOPE_READWRITE)
}

/// Whether a scope string permits writes. Fails closed on unknown scopes.
#[must_use]
pub fn scope_is_write(scope: &str) -> bool {
    matches!(scope, SCOPE_ALL | SCOPE_READWRITE)
}

/// Whether a stored scope covers a requested scope in the lattice
/// `*` > `readwrite` > `readonly`; equal scopes always cover.
#[must_use]
pub fn scope_covers(stored: &str, requested: &str) -> bool {
    if stored == requested {
        return true;
    }
    match stored {
        SCOPE_ALL => matches!(requested, SCOPE_READWRITE | SCOPE_READONLY),
        SCOPE_READWRITE => requested == SCOPE_READONLY,
        _ => false,
    }
}

/// Write-scope check for request authorization.
///
/// No claims means the deployment runs without auth; an empty scope is a
/// signed token (full access); otherwise only `*` and `readwrite` pass.
#[must_use]
pub fn check_write_scope(claims: Option<&Claims>) -> bool {
    match claims {
        None => true,
        Some(c) if c.api_key_scope.is_empty() => true,
        Some(c) => scope_is_write(&c.api_key_scope),
    }
}

/// Table-level authorization check. An empty restriction list passes every
/// table; otherwise membership is case-sensitive and exact.
#[must_use]
pub fn check_table_scope(claims: Option<&Claims>, table: &str) -> bool {
    match claims {
        None => true,
        Some(c) if c.allowed_tables.is_empty() => true,
        Some(c) => c.allowed_tables.iter().any(|t| t == table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_orders_oauth_before_api_key() {
        assert_eq!(classify("ayb_at_abc"), CredentialKind::OAuthAccessToken);
        assert_eq!(classify("ayb_abc"), CredentialKind::ApiKey);
        assert_eq!(classify("eyJhbGciOi"), CredentialKind::SignedToken);
        // the refresh-token prefix is not an access-token prefix, but it is
        // still in the ayb_ family and must not reach the JWT validator
        assert_eq!(classify("ayb_rt_abc"), CredentialKind::ApiKey);
    }

    #[test]
    fn api_key_prefix_alone_is_not_a_key() {
        assert!(!is_api_key("ayb_"));
        assert!(is_api_key("ayb_x"));
    }

    #[test]
    fn client_id_shape_is_exact() {
        let id = format!("ayb_cid_{}", "a".repeat(48));
        assert!(is_oauth_client_id(&id));
        assert!(!is_oauth_client_id(&format!("ayb_cid_{}", "A".repeat(48))));
        assert!(!is_oauth_client_id(&format!("ayb_cid_{}", "a".repeat(47))));
        assert!(!is_oauth_client_id(&format!("ayb_cid_{}", "g".repeat(48))));
        assert!(!is_oauth_client_id("ayb_cs_aaaa"));
    }

    #[test]
    fn generated_credentials_have_wire_exact_shapes() {
        let key = generate_api_key();
        assert_eq!(key.plaintext.len(), 52);
        assert!(is_api_key(&key.plaintext));
        assert_eq!(key.display_prefix.len(), 12);
        assert_eq!(key.key_hash, crate::crypto::sha256_hex(&key.plaintext));

        assert_eq!(generate_oauth_access_token().len(), 7 + 64);
        assert_eq!(generate_oauth_refresh_token().len(), 7 + 96);
        assert!(is_oauth_client_id(&generate_oauth_client_id()));
        assert_eq!(generate_oauth_client_secret().len(), 7 + 64);
    }

    #[test]
    fn scope_predicates_fail_closed() {
        for scope in [SCOPE_ALL, SCOPE_READONLY, SCOPE_READWRITE] {
            assert!(scope_is_read(scope));
        }
        assert!(scope_is_write(SCOPE_ALL));
        assert!(scope_is_write(SCOPE_READWRITE));
        assert!(!scope_is_write(SCOPE_READONLY));
        assert!(!scope_is_read("admin"));
        assert!(!scope_is_write("admin"));
    }

    #[test]
    fn scope_lattice_covers_downward() {
        assert!(scope_covers("*", "readonly"));
        assert!(scope_covers("*", "readwrite"));
        assert!(scope_covers("readwrite", "readonly"));
        assert!(scope_covers("readonly", "readonly"));
        assert!(!scope_covers("readonly", "readwrite"));
        assert!(!scope_covers("readwrite", "*"));
    }

    #[test]
    fn write_scope_check_matches_contract() {
        assert!(check_write_scope(None));
        let mut claims = Claims::default();
        assert!(check_write_scope(Some(&claims))); // signed token, empty scope
        claims.api_key_scope = SCOPE_READWRITE.into();
        assert!(check_write_scope(Some(&claims)));
        claims.api_key_scope = SCOPE_READONLY.into();
        assert!(!check_write_scope(Some(&claims)));
        claims.api_key_scope = "bogus".into();
        assert!(!check_write_scope(Some(&claims)));
    }

    #[test]
    fn table_scope_is_exact_and_case_sensitive() {
        let mut claims = Claims::default();
        assert!(check_table_scope(Some(&claims), "orders"));
        claims.allowed_tables = vec!["orders".into()];
        assert!(check_table_scope(Some(&claims), "orders"));
        assert!(!check_table_scope(Some(&claims), "Orders"));
        assert!(!check_table_scope(Some(&claims), "users"));
    }
}
