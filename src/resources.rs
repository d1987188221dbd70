// ABOUTME: Shared server state handed to every route handler
// ABOUTME: Wires services, the authorization server, limiters, and background tasks
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

use crate::auth::{generate_jwt_secret, AuthManager};
use crate::config::ServerConfig;
use crate::constants::timeouts;
use crate::database::Database;
use crate::external::{Mailer, SmsProvider};
use crate::oauth2::provider::OAuth2Provider;
use crate::oauth_consumer::OAuthStateStore;
use crate::rate_limiting::{AppRateLimiter, RateLimiter};
use crate::services::{IdentityService, MfaService, SmsService};
use std::sync::Arc;

/// Everything a request handler can reach, assembled once at startup
pub struct ServerResources {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Persistence adapter
    pub database: Arc<Database>,
    /// Signed-token manager
    pub auth: Arc<AuthManager>,
    /// Identity service
    pub identity: Arc<IdentityService>,
    /// SMS OTP service
    pub sms: Arc<SmsService>,
    /// MFA service
    pub mfa: Arc<MfaService>,
    /// OAuth 2.1 authorization server
    pub oauth_provider: Arc<OAuth2Provider>,
    /// Per-IP limiter for credential-sensitive endpoints
    pub ip_limiter: Arc<RateLimiter>,
    /// Per-app limiter driven by claims
    pub app_limiter: Arc<AppRateLimiter>,
    /// CSRF state store for the outbound consumer flow
    pub oauth_states: Arc<OAuthStateStore>,
    /// Dedicated client for provider exchanges, 10-second total timeout
    pub http_client: reqwest::Client,
}

impl ServerResources {
    /// Wire up all services. The signing secret comes from configuration or
    /// is generated fresh, invalidating tokens across restarts.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        database: Database,
        mailer: Arc<dyn Mailer>,
        sms_provider: Arc<dyn SmsProvider>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let database = Arc::new(database);

        let secret = config
            .auth
            .jwt_secret
            .clone()
            .unwrap_or_else(generate_jwt_secret);
        let auth = Arc::new(AuthManager::new(
            secret.into_bytes(),
            config.auth.token_expiry_hours,
        ));

        let identity = Arc::new(IdentityService::new(
            database.clone(),
            auth.clone(),
            mailer,
            config.clone(),
        ));
        let sms = Arc::new(SmsService::new(
            database.clone(),
            sms_provider,
            identity.clone(),
            config.clone(),
        ));
        let mfa = Arc::new(MfaService::new(
            database.clone(),
            sms.clone(),
            identity.clone(),
        ));
        let oauth_provider = Arc::new(OAuth2Provider::new(database.clone()));

        let ip_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests_per_window,
            config.rate_limit.window_seconds,
        ));
        let app_limiter = Arc::new(AppRateLimiter::new());
        let oauth_states = Arc::new(OAuthStateStore::new());

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeouts::OAUTH_EXCHANGE_SECS))
            .build()
            .unwrap_or_default();

        Arc::new(Self {
            config,
            database,
            auth,
            identity,
            sms,
            mfa,
            oauth_provider,
            ip_limiter,
            app_limiter,
            oauth_states,
            http_client,
        })
    }

    /// Stop and join every background task. Called after the HTTP server has
    /// drained in-flight requests.
    pub async fn shutdown_background(&self) {
        self.ip_limiter.shutdown().await;
        self.app_limiter.shutdown().await;
        self.oauth_states.shutdown().await;
    }
}
