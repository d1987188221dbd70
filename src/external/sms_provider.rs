// ABOUTME: SMS provider boundary: trait and a logging implementation
// ABOUTME: The OTP subsystem renders messages; transports live outside the core

use async_trait::async_trait;

/// Outbound SMS transport
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Deliver one message to an E.164 phone number
    async fn send(&self, phone: &str, message: &str) -> anyhow::Result<()>;
}

/// Development provider that logs instead of delivering
pub struct LogSmsProvider;

#[async_trait]
impl SmsProvider for LogSmsProvider {
    async fn send(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        tracing::info!(%phone, "sms (log transport): {message}");
        Ok(())
    }
}
