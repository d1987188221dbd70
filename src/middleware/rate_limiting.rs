// ABOUTME: Rate limiting middleware: per-IP on credential endpoints, per-app after auth
// ABOUTME: Emits X-RateLimit-* headers on every response and Retry-After on denial

//! # Rate Limiting Middleware
//!
//! The per-IP limiter guards credential-sensitive public endpoints. The
//! per-app limiter runs after authentication and throttles by the app
//! configuration carried in claims.
//!
//! Forwarding headers (`X-Forwarded-For`, `X-Real-IP`) are trusted only when
//! the direct peer is loopback or RFC 1918 / RFC 4193 private, so a directly
//! Internet-exposed deployment cannot be spoofed into someone else's bucket.

use crate::credentials::Claims;
use crate::errors::{AppError, ErrorCode};
use crate::rate_limiting::RateLimitDecision;
use crate::resources::ServerResources;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Rate limit header names
pub mod headers {
    pub const LIMIT: &str = "X-RateLimit-Limit";
    pub const REMAINING: &str = "X-RateLimit-Remaining";
    pub const RESET: &str = "X-RateLimit-Reset";
    pub const APP_LIMIT: &str = "X-App-RateLimit-Limit";
    pub const APP_REMAINING: &str = "X-App-RateLimit-Remaining";
    pub const APP_RESET: &str = "X-App-RateLimit-Reset";
    pub const RETRY_AFTER: &str = "Retry-After";
}

fn is_trusted_peer(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        // loopback or RFC 4193 unique-local (fc00::/7)
        IpAddr::V6(v6) => v6.is_loopback() || (v6.octets()[0] & 0xfe) == 0xfc,
    }
}

/// Resolve the client IP for rate limiting. Forwarding headers count only
/// when the direct peer is a trusted proxy.
#[must_use]
pub fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap) -> String {
    let Some(peer) = peer else {
        return "unknown".into();
    };

    if is_trusted_peer(peer) {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return forwarded.to_owned();
        }
        if let Some(real_ip) = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return real_ip.to_owned();
        }
    }

    peer.to_string()
}

fn insert_header(response_headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        response_headers.insert(name, value);
    }
}

fn apply_decision_headers(
    response_headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    limit_header: &'static str,
    remaining_header: &'static str,
    reset_header: &'static str,
) {
    insert_header(response_headers, limit_header, &decision.limit.to_string());
    insert_header(
        response_headers,
        remaining_header,
        &decision.remaining.to_string(),
    );
    insert_header(
        response_headers,
        reset_header,
        &decision.reset_at.timestamp().to_string(),
    );
}

fn retry_after_seconds(decision: &RateLimitDecision) -> i64 {
    let millis = (decision.reset_at - Utc::now()).num_milliseconds();
    // ceiling, with a floor of one second
    ((millis + 999) / 1000).max(1)
}

fn too_many_requests(
    decision: &RateLimitDecision,
    limit_header: &'static str,
    remaining_header: &'static str,
    reset_header: &'static str,
) -> Response {
    let mut response = AppError::new(
        ErrorCode::RateLimitExceeded,
        ErrorCode::RateLimitExceeded.description(),
    )
    .into_response();
    apply_decision_headers(
        response.headers_mut(),
        decision,
        limit_header,
        remaining_header,
        reset_header,
    );
    insert_header(
        response.headers_mut(),
        headers::RETRY_AFTER,
        &retry_after_seconds(decision).to_string(),
    );
    response
}

/// Per-IP sliding-window limiting for credential-sensitive endpoints
pub async fn ip_rate_limit(
    State(resources): State<Arc<ServerResources>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let key = client_ip(peer, request.headers());

    let decision = resources.ip_limiter.allow(&key);
    if !decision.allowed {
        tracing::warn!(client = %key, "request rate limited");
        return too_many_requests(
            &decision,
            headers::LIMIT,
            headers::REMAINING,
            headers::RESET,
        );
    }

    let mut response = next.run(request).await;
    apply_decision_headers(
        response.headers_mut(),
        &decision,
        headers::LIMIT,
        headers::REMAINING,
        headers::RESET,
    );
    response
}

/// Per-app limiting driven by the validated credential's app configuration.
/// Requests without an app or without a positive limit pass through.
pub async fn app_rate_limit(
    State(resources): State<Arc<ServerResources>>,
    request: Request,
    next: Next,
) -> Response {
    let app_limit = request.extensions().get::<Claims>().and_then(|claims| {
        let app_id = claims.app_id.clone()?;
        let rps = claims.app_rate_limit_rps.filter(|rps| *rps > 0)?;
        let window = claims.app_rate_limit_window_seconds.unwrap_or(1).max(1);
        Some((app_id, rps, window))
    });

    let Some((app_id, rps, window)) = app_limit else {
        return next.run(request).await;
    };

    let limit = usize::try_from(rps).unwrap_or(usize::MAX);
    let decision = resources.app_limiter.allow(&app_id, limit, window);
    if !decision.allowed {
        tracing::warn!(%app_id, "app rate limited");
        return too_many_requests(
            &decision,
            headers::APP_LIMIT,
            headers::APP_REMAINING,
            headers::APP_RESET,
        );
    }

    let mut response = next.run(request).await;
    apply_decision_headers(
        response.headers_mut(),
        &decision,
        headers::APP_LIMIT,
        headers::APP_REMAINING,
        headers::APP_RESET,
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn forwarding_headers_trusted_only_from_private_peers() {
        let forwarded = header_map(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);

        // private peer: first forwarded entry wins
        assert_eq!(
            client_ip(Some("10.1.2.3".parse().unwrap()), &forwarded),
            "203.0.113.9"
        );
        // public peer: header ignored
        assert_eq!(
            client_ip(Some("198.51.100.7".parse().unwrap()), &forwarded),
            "198.51.100.7"
        );
    }

    #[test]
    fn real_ip_is_second_choice() {
        let headers = header_map(&[("x-real-ip", "203.0.113.44")]);
        assert_eq!(
            client_ip(Some("127.0.0.1".parse().unwrap()), &headers),
            "203.0.113.44"
        );
    }

    #[test]
    fn unique_local_v6_is_trusted() {
        assert!(is_trusted_peer("fd12:3456::1".parse().unwrap()));
        assert!(!is_trusted_peer("2001:db8::1".parse().unwrap()));
    }
}
