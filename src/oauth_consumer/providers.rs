// ABOUTME: Outbound provider profiles: authorize URLs, token exchange, userinfo
// ABOUTME: Exchanges run on a dedicated client with a 10-second total timeout

use crate::config::environment::OAuthProviderConfig;
use crate::errors::{AppError, AppResult};
use serde::Deserialize;

/// Supported external identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    /// Parse the path segment
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            _ => None,
        }
    }

    /// Path segment and log name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    const fn authorize_endpoint(self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::Github => "https://github.com/login/oauth/authorize",
        }
    }

    const fn token_endpoint(self) -> &'static str {
        match self {
            Self::Google => "https://oauth2.googleapis.com/token",
            Self::Github => "https://github.com/login/oauth/access_token",
        }
    }

    const fn scope(self) -> &'static str {
        match self {
            Self::Google => "openid email",
            Self::Github => "user:email",
        }
    }

    /// Build the provider authorize redirect URL
    #[must_use]
    pub fn authorize_url(self, config: &OAuthProviderConfig, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.authorize_endpoint(),
            urlencoding::encode(&config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(self.scope()),
            urlencoding::encode(state),
        )
    }
}

/// The profile fields account linking needs
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Email as reported by the provider
    pub email: String,
    /// Whether the provider vouches for the email
    pub email_verified: bool,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    email: String,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Exchange an authorization code and fetch the user's verified email.
///
/// Both calls honor the client's 10-second total timeout; a slow provider
/// fails the login rather than holding the request open.
pub async fn exchange_code(
    provider: Provider,
    config: &OAuthProviderConfig,
    http: &reqwest::Client,
    redirect_uri: &str,
    code: &str,
) -> AppResult<ProviderProfile> {
    let token: TokenExchangeResponse = http
        .post(provider.token_endpoint())
        .header("Accept", "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ])
        .send()
        .await
        .map_err(|e| provider_error(provider, "token exchange", &e))?
        .error_for_status()
        .map_err(|e| provider_error(provider, "token exchange", &e))?
        .json()
        .await
        .map_err(|e| provider_error(provider, "token response", &e))?;

    match provider {
        Provider::Google => {
            let info: GoogleUserInfo = http
                .get("https://openidconnect.googleapis.com/v1/userinfo")
                .bearer_auth(&token.access_token)
                .send()
                .await
                .map_err(|e| provider_error(provider, "userinfo", &e))?
                .error_for_status()
                .map_err(|e| provider_error(provider, "userinfo", &e))?
                .json()
                .await
                .map_err(|e| provider_error(provider, "userinfo response", &e))?;
            Ok(ProviderProfile {
                email: info.email,
                email_verified: info.email_verified,
            })
        }
        Provider::Github => {
            let emails: Vec<GithubEmail> = http
                .get("https://api.github.com/user/emails")
                .bearer_auth(&token.access_token)
                .header("User-Agent", crate::constants::SERVICE_NAME)
                .send()
                .await
                .map_err(|e| provider_error(provider, "emails", &e))?
                .error_for_status()
                .map_err(|e| provider_error(provider, "emails", &e))?
                .json()
                .await
                .map_err(|e| provider_error(provider, "emails response", &e))?;

            let primary = emails
                .into_iter()
                .find(|e| e.primary)
                .ok_or_else(|| AppError::auth_invalid("provider returned no primary email"))?;
            Ok(ProviderProfile {
                email: primary.email,
                email_verified: primary.verified,
            })
        }
    }
}

fn provider_error(provider: Provider, stage: &str, error: &dyn std::fmt::Display) -> AppError {
    tracing::warn!(provider = provider.name(), "{stage} failed: {error}");
    AppError::internal(format!("{} {stage} failed", provider.name()))
}
