// ABOUTME: Outbound collaborator interfaces for the auth service
// ABOUTME: Transports are injected; the core only depends on these traits
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

/// Mailer interface and templates
pub mod mailer;

/// SMS provider interface
pub mod sms_provider;

pub use mailer::{LogMailer, Mailer};
pub use sms_provider::{LogSmsProvider, SmsProvider};
