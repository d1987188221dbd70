// ABOUTME: Mailer boundary: trait, templates, and a logging implementation
// ABOUTME: Mail sending is always best-effort; failures are logged, never propagated

use async_trait::async_trait;

/// A rendered mail ready for a transport
#[derive(Debug, Clone)]
pub struct Mail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Outbound mail transport. SMTP wiring lives outside the core; the service
/// renders templates and hands finished mails to this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one mail
    async fn send(&self, mail: Mail) -> anyhow::Result<()>;
}

/// Development mailer that logs instead of delivering
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> anyhow::Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail (log transport): {}", mail.body);
        Ok(())
    }
}

/// Render the email-verification mail
#[must_use]
pub fn verification_mail(to: &str, external_url: &str, token: &str) -> Mail {
    Mail {
        to: to.to_owned(),
        subject: "Verify your email".into(),
        body: format!(
            "Confirm your email address by posting this token to {external_url}/verify:\n\n{token}\n\nThe token expires in one hour."
        ),
    }
}

/// Render the password-reset mail
#[must_use]
pub fn password_reset_mail(to: &str, external_url: &str, token: &str) -> Mail {
    Mail {
        to: to.to_owned(),
        subject: "Reset your password".into(),
        body: format!(
            "Reset your password by posting this token to {external_url}/password-reset/confirm:\n\n{token}\n\nIf you did not request a reset, ignore this mail."
        ),
    }
}

/// Render the magic-link mail
#[must_use]
pub fn magic_link_mail(to: &str, external_url: &str, token: &str) -> Mail {
    Mail {
        to: to.to_owned(),
        subject: "Your sign-in link".into(),
        body: format!(
            "Sign in by posting this token to {external_url}/magic-link/confirm:\n\n{token}\n\nThe link expires in one hour."
        ),
    }
}
