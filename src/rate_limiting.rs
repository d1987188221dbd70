// ABOUTME: In-memory sliding-window rate limiters for per-IP and per-app throttling
// ABOUTME: Buckets live under a mutex; a stoppable background task prunes empty buckets
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Sliding-Window Rate Limiting
//!
//! Each key owns a bucket of request timestamps. A request is allowed when,
//! after pruning entries older than the window, the bucket holds fewer than
//! `limit` timestamps. On denial the reset time is the oldest surviving
//! timestamp plus the window.
//!
//! The per-IP limiter carries fixed parameters; the per-app limiter reuses
//! the same algorithm with (limit, window) supplied per call from claims.
//! Both run a cleanup task that drops empty buckets and stops cleanly on
//! shutdown.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Outcome of one `allow` call, carrying what the response headers need
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Window capacity
    pub limit: usize,
    /// Requests left in the window after this call
    pub remaining: usize,
    /// When the window frees a slot
    pub reset_at: DateTime<Utc>,
}

/// Timestamp buckets shared by both limiter flavors
type Buckets = Mutex<HashMap<String, Vec<DateTime<Utc>>>>;

fn decide(
    buckets: &Buckets,
    key: &str,
    limit: usize,
    window: Duration,
    now: DateTime<Utc>,
) -> RateLimitDecision {
    let mut map = buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let bucket = map.entry(key.to_owned()).or_default();

    let cutoff = now - window;
    bucket.retain(|stamp| *stamp > cutoff);

    if bucket.len() >= limit {
        let oldest = bucket.first().copied().unwrap_or(now);
        return RateLimitDecision {
            allowed: false,
            limit,
            remaining: 0,
            reset_at: oldest + window,
        };
    }

    bucket.push(now);
    let oldest = bucket.first().copied().unwrap_or(now);
    RateLimitDecision {
        allowed: true,
        limit,
        remaining: limit - bucket.len(),
        reset_at: oldest + window,
    }
}

fn prune_empty(buckets: &Buckets, window: Duration, now: DateTime<Utc>) {
    let cutoff = now - window;
    let mut map = buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    map.retain(|_key, bucket| {
        bucket.retain(|stamp| *stamp > cutoff);
        !bucket.is_empty()
    });
}

fn spawn_cleanup(
    buckets: std::sync::Arc<Buckets>,
    interval_secs: u64,
    window: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => prune_empty(&buckets, window, Utc::now()),
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Per-IP limiter with fixed parameters
pub struct RateLimiter {
    buckets: std::sync::Arc<Buckets>,
    limit: usize,
    window: Duration,
    stop_tx: watch::Sender<bool>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a limiter and start its cleanup task. The cleanup interval
    /// equals the window.
    #[must_use]
    pub fn new(limit: usize, window_seconds: u64) -> Self {
        let buckets = std::sync::Arc::new(Buckets::default());
        let window = Duration::seconds(i64::try_from(window_seconds).unwrap_or(60));
        let (stop_tx, stop_rx) = watch::channel(false);
        let cleanup = spawn_cleanup(buckets.clone(), window_seconds, window, stop_rx);
        Self {
            buckets,
            limit,
            window,
            stop_tx,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    /// Check and record one request for a key
    #[must_use]
    pub fn allow(&self, key: &str) -> RateLimitDecision {
        decide(&self.buckets, key, self.limit, self.window, Utc::now())
    }

    /// Stop the cleanup task and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self
            .cleanup
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Per-app limiter: same algorithm, parameters supplied per call from the
/// validated credential's app configuration
pub struct AppRateLimiter {
    buckets: std::sync::Arc<Buckets>,
    stop_tx: watch::Sender<bool>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

/// Longest window an app may configure; bounds cleanup retention
const MAX_APP_WINDOW_SECS: i64 = 3600;

impl AppRateLimiter {
    /// Create the limiter and start its cleanup task
    #[must_use]
    pub fn new() -> Self {
        let buckets = std::sync::Arc::new(Buckets::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let cleanup = spawn_cleanup(
            buckets.clone(),
            60,
            Duration::seconds(MAX_APP_WINDOW_SECS),
            stop_rx,
        );
        Self {
            buckets,
            stop_tx,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    /// Check and record one request for an app. Callers skip the call
    /// entirely when the app has no positive limit.
    #[must_use]
    pub fn allow(&self, app_id: &str, limit: usize, window_seconds: i64) -> RateLimitDecision {
        let window = Duration::seconds(window_seconds.clamp(1, MAX_APP_WINDOW_SECS));
        decide(&self.buckets, app_id, limit, window, Utc::now())
    }

    /// Stop the cleanup task and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self
            .cleanup
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Default for AppRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(3, 60);
        for i in 0..3 {
            let decision = limiter.allow("10.0.0.1");
            assert!(decision.allowed, "call {i} should be allowed");
        }
        let denied = limiter.allow("10.0.0.1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_at > Utc::now());
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.allow("a").allowed);
        assert!(!limiter.allow("a").allowed);
        assert!(limiter.allow("b").allowed);
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = RateLimiter::new(2, 60);
        assert_eq!(limiter.allow("k").remaining, 1);
        assert_eq!(limiter.allow("k").remaining, 0);
        limiter.shutdown().await;
    }

    #[tokio::test]
    async fn app_limiter_uses_per_call_parameters() {
        let limiter = AppRateLimiter::new();
        assert!(limiter.allow("app-1", 1, 60).allowed);
        assert!(!limiter.allow("app-1", 1, 60).allowed);
        // a different app with a bigger budget is unaffected
        assert!(limiter.allow("app-2", 5, 60).allowed);
        limiter.shutdown().await;
    }

    #[test]
    fn window_pruning_frees_slots() {
        let buckets = Buckets::default();
        let window = Duration::seconds(60);
        let start = Utc::now();

        assert!(decide(&buckets, "k", 1, window, start).allowed);
        assert!(!decide(&buckets, "k", 1, window, start + Duration::seconds(30)).allowed);
        // past the window the old stamp is pruned
        assert!(decide(&buckets, "k", 1, window, start + Duration::seconds(61)).allowed);
    }

    #[test]
    fn empty_buckets_are_dropped() {
        let buckets = Buckets::default();
        let window = Duration::seconds(60);
        let start = Utc::now();
        let _ = decide(&buckets, "gone", 5, window, start);

        prune_empty(&buckets, window, start + Duration::seconds(120));
        assert!(buckets.lock().unwrap().is_empty());
    }
}
