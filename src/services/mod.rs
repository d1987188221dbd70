// ABOUTME: Domain service layer for business logic extracted from route handlers
// ABOUTME: Services return tagged error kinds; handlers map them to HTTP
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

/// User lifecycle, sessions, and passwordless flows
pub mod identity;

/// SMS MFA enrollment state machine and pending-token gating
pub mod mfa;

/// SMS OTP issuance and verification with the daily circuit breaker
pub mod sms;

pub use identity::{IdentityService, IssuedTokens};
pub use mfa::MfaService;
pub use sms::{SmsPurpose, SmsService};
