// ABOUTME: In-memory CSRF state store for the outbound OAuth consumer flow
// ABOUTME: Entries expire individually; a stoppable sweeper prunes the map

use crate::constants::durations;
use crate::crypto;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Short-lived `state` tokens for the outbound provider flow
pub struct OAuthStateStore {
    entries: std::sync::Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    stop_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl OAuthStateStore {
    /// Create the store and start its sweeper task
    #[must_use]
    pub fn new() -> Self {
        let entries = std::sync::Arc::new(Mutex::new(HashMap::new()));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let sweep_entries = entries.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        sweep_entries
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .retain(|_token, expiry| *expiry > now);
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            entries,
            stop_tx,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Mint and remember a fresh state token
    #[must_use]
    pub fn issue(&self) -> String {
        let token = crypto::random_base64url();
        let expiry = Utc::now() + Duration::minutes(durations::OAUTH_STATE_MINUTES);
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(token.clone(), expiry);
        token
    }

    /// Consume a state token exactly once. Expired or unknown tokens fail.
    #[must_use]
    pub fn consume(&self, token: &str) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match entries.remove(token) {
            Some(expiry) => expiry > Utc::now(),
            None => false,
        }
    }

    /// Stop the sweeper and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_is_single_use() {
        let store = OAuthStateStore::new();
        let token = store.issue();
        assert!(store.consume(&token));
        assert!(!store.consume(&token));
        assert!(!store.consume("never-issued"));
        store.shutdown().await;
    }
}
