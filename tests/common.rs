// ABOUTME: Shared test fixtures: in-memory resources with capturing transports
// ABOUTME: Provides config builders and helpers for extracting codes from sent messages

#![allow(dead_code)]

use async_trait::async_trait;
use ayb_auth_server::config::environment::{
    AuthConfig, DatabaseUrl, Environment, RateLimitConfig, ServerConfig, SmsConfig,
};
use ayb_auth_server::database::Database;
use ayb_auth_server::external::mailer::{Mail, Mailer};
use ayb_auth_server::external::sms_provider::SmsProvider;
use ayb_auth_server::resources::ServerResources;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// SMS provider that records every message instead of sending
#[derive(Default)]
pub struct CapturingSms {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl CapturingSms {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Digits at the end of the most recent message to a phone
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.messages()
            .iter()
            .rev()
            .find(|(to, _)| to == phone)
            .map(|(_, message)| {
                message
                    .chars()
                    .rev()
                    .take_while(char::is_ascii_digit)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect()
            })
    }
}

#[async_trait]
impl SmsProvider for CapturingSms {
    async fn send(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_owned(), message.to_owned()));
        Ok(())
    }
}

/// Mailer that records every mail instead of sending
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<Mail>>,
}

impl CapturingMailer {
    pub fn mails(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }

    /// The one-time token is the last whitespace-separated block that looks
    /// like base64url in the most recent mail to an address
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        self.mails()
            .iter()
            .rev()
            .find(|mail| mail.to == to)
            .and_then(|mail| {
                mail.body
                    .split_whitespace()
                    .filter(|word| {
                        word.len() >= 40
                            && word
                                .chars()
                                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                    })
                    .next_back()
                    .map(str::to_owned)
            })
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, mail: Mail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Baseline configuration for tests
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        external_url: "http://localhost:8080".into(),
        database_url: DatabaseUrl::Memory,
        environment: Environment::Testing,
        auth: AuthConfig {
            jwt_secret: None,
            token_expiry_hours: 24,
            refresh_expiry_days: 30,
            min_password_length: 8,
        },
        sms: SmsConfig {
            code_length: 6,
            code_expiry_minutes: 5,
            max_attempts: 3,
            daily_limit: 0,
            allowed_countries: Vec::new(),
            test_phones: HashMap::new(),
        },
        rate_limit: RateLimitConfig {
            requests_per_window: 100,
            window_seconds: 60,
        },
        google_oauth: None,
        github_oauth: None,
    }
}

/// Fully wired in-memory resources with capturing transports
pub async fn test_resources_with(
    configure: impl FnOnce(&mut ServerConfig),
) -> (Arc<ServerResources>, Arc<CapturingSms>, Arc<CapturingMailer>) {
    let mut config = test_config();
    configure(&mut config);

    let database = Database::new("sqlite::memory:")
        .await
        .expect("in-memory database");

    let sms = Arc::new(CapturingSms::default());
    let mailer = Arc::new(CapturingMailer::default());
    let resources = ServerResources::new(config, database, mailer.clone(), sms.clone());
    (resources, sms, mailer)
}

/// Resources with default test configuration
pub async fn test_resources() -> (Arc<ServerResources>, Arc<CapturingSms>, Arc<CapturingMailer>) {
    test_resources_with(|_| {}).await
}
