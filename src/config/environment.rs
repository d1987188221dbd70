// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Environment-based configuration management for production deployment

use crate::constants::{durations, limits};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Environment type for security and logging decisions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Type-safe database location
#[derive(Debug, Clone)]
pub enum DatabaseUrl {
    /// `SQLite` database file
    SQLite { path: PathBuf },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to a sqlx connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}?mode=rwc", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }
}

/// Signed-token and session settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret; generated at startup when unset
    pub jwt_secret: Option<String>,
    /// Signed access-token lifetime in hours
    pub token_expiry_hours: i64,
    /// First-party refresh session lifetime in days
    pub refresh_expiry_days: i64,
    /// Minimum accepted password length
    pub min_password_length: usize,
}

/// SMS OTP subsystem settings
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// Number of digits per code
    pub code_length: usize,
    /// Code lifetime in minutes
    pub code_expiry_minutes: i64,
    /// Failed attempts before the code is destroyed
    pub max_attempts: i64,
    /// Codes issued per calendar day before the circuit breaker opens;
    /// zero disables the breaker
    pub daily_limit: i64,
    /// ISO 3166-1 alpha-2 allow-list; empty allows every country
    pub allowed_countries: Vec<String>,
    /// Test phones mapped to predetermined codes; these never count against
    /// the daily limit and never reach the provider
    pub test_phones: HashMap<String, String>,
}

/// Per-IP rate limiting settings for credential-sensitive endpoints
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window and IP
    pub requests_per_window: usize,
    /// Window length in seconds
    pub window_seconds: u64,
}

/// One outbound OAuth provider this service logs in against
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    /// Provider-issued client id
    pub client_id: String,
    /// Provider-issued client secret
    pub client_secret: String,
}

/// Top-level server configuration, assembled from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Externally visible base URL, used in mail links and OAuth callbacks
    pub external_url: String,
    /// Database location
    pub database_url: DatabaseUrl,
    /// Deployment environment
    pub environment: Environment,
    /// Signed-token settings
    pub auth: AuthConfig,
    /// SMS settings
    pub sms: SmsConfig,
    /// Per-IP rate limiting
    pub rate_limit: RateLimitConfig,
    /// Google login credentials, when configured
    pub google_oauth: Option<OAuthProviderConfig>,
    /// GitHub login credentials, when configured
    pub github_oauth: Option<OAuthProviderConfig>,
}

impl ServerConfig {
    /// Assemble configuration from environment variables.
    ///
    /// Unset variables fall back to development defaults; malformed numeric
    /// values are an error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let http_port = parse_env("HTTP_PORT", 8080)?;
        let external_url =
            env::var("EXTERNAL_URL").unwrap_or_else(|_| format!("http://localhost:{http_port}"));
        let database_url = DatabaseUrl::parse_url(
            &env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:ayb-auth.db".into()),
        );
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        );

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET").ok(),
            token_expiry_hours: parse_env("TOKEN_EXPIRY_HOURS", durations::ACCESS_TOKEN_HOURS)?,
            refresh_expiry_days: parse_env("REFRESH_EXPIRY_DAYS", durations::REFRESH_SESSION_DAYS)?,
            min_password_length: parse_env("MIN_PASSWORD_LENGTH", limits::MIN_PASSWORD_LENGTH)?,
        };

        if auth.jwt_secret.is_none() && environment.is_production() {
            warn!("JWT_SECRET is unset in production; a random secret will be generated and all tokens will be invalidated on restart");
        }

        let sms = SmsConfig {
            code_length: parse_env("SMS_CODE_LENGTH", limits::SMS_CODE_LENGTH)?,
            code_expiry_minutes: parse_env("SMS_CODE_EXPIRY_MINUTES", limits::SMS_CODE_MINUTES)?,
            max_attempts: parse_env("SMS_MAX_ATTEMPTS", limits::SMS_MAX_ATTEMPTS)?,
            daily_limit: parse_env("SMS_DAILY_LIMIT", 0)?,
            allowed_countries: parse_csv(&env::var("SMS_ALLOWED_COUNTRIES").unwrap_or_default()),
            test_phones: parse_test_phones(&env::var("SMS_TEST_PHONES").unwrap_or_default()),
        };

        let rate_limit = RateLimitConfig {
            requests_per_window: parse_env("RATE_LIMIT_REQUESTS", 10)?,
            window_seconds: parse_env("RATE_LIMIT_WINDOW_SECONDS", 60)?,
        };

        Ok(Self {
            http_port,
            external_url,
            database_url,
            environment,
            auth,
            sms,
            rate_limit,
            google_oauth: provider_from_env("GOOGLE"),
            github_oauth: provider_from_env("GITHUB"),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// `SMS_TEST_PHONES` format: `+15551230001=111111,+15551230002=222222`
fn parse_test_phones(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (phone, code) = pair.trim().split_once('=')?;
            if phone.is_empty() || code.is_empty() {
                return None;
            }
            Some((phone.to_owned(), code.to_owned()))
        })
        .collect()
}

fn provider_from_env(prefix: &str) -> Option<OAuthProviderConfig> {
    let client_id = env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    Some(OAuthProviderConfig {
        client_id,
        client_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_variants() {
        assert!(matches!(
            DatabaseUrl::parse_url("sqlite::memory:"),
            DatabaseUrl::Memory
        ));
        match DatabaseUrl::parse_url("sqlite:/data/auth.db") {
            DatabaseUrl::SQLite { path } => assert_eq!(path, PathBuf::from("/data/auth.db")),
            DatabaseUrl::Memory => panic!("expected file database"),
        }
    }

    #[test]
    fn csv_parsing_trims_and_uppercases() {
        assert_eq!(parse_csv("us, ca ,"), vec!["US", "CA"]);
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn test_phone_map_parsing() {
        let phones = parse_test_phones("+15551230001=111111, +15551230002=222222");
        assert_eq!(phones.get("+15551230001").map(String::as_str), Some("111111"));
        assert_eq!(phones.len(), 2);
    }
}
