// ABOUTME: Persistence adapter over sqlx with idempotent migrations
// ABOUTME: One submodule per aggregate; atomic transitions use guarded statements
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Persistence Adapter
//!
//! All state lives in a single relational store owned by one logical service
//! instance. Migrations are idempotent `CREATE TABLE IF NOT EXISTS`
//! statements run at startup.
//!
//! The correctness-critical transitions (authorization-code consumption,
//! refresh rotation, single-use token consumption) are implemented as
//! transactions over guarded `UPDATE`/`DELETE` statements with
//! affected-row checks; no validate path does a bare SELECT-then-write.

mod api_keys;
mod apps;
mod mfa;
mod oauth2;
mod one_time;
mod sessions;
mod sms;
mod users;

pub use api_keys::ApiKeyAuth;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;

/// Database handle shared across the service
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations.
    ///
    /// Foreign keys are enforced on every connection; the API-key → app
    /// reference relies on `ON DELETE RESTRICT` firing during user deletion.
    pub async fn new(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database exists per connection, so the pool must be
        // pinned to a single long-lived connection to stay coherent.
        let is_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if is_memory { 1 } else { 5 });
        if is_memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Access the underlying pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction for a multi-statement atomic transition
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Run all idempotent migrations
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        self.migrate_users().await?;
        self.migrate_sessions().await?;
        self.migrate_apps().await?;
        self.migrate_api_keys().await?;
        self.migrate_oauth().await?;
        self.migrate_mfa().await?;
        self.migrate_sms().await?;
        self.migrate_one_time().await?;
        tracing::debug!("database migrations complete");
        Ok(())
    }
}

/// Serialize a table list to its storage form. `None` (no restriction
/// recorded) and `Some(vec![])` are distinct for consent coverage.
pub(crate) fn tables_to_json(tables: Option<&[String]>) -> Option<String> {
    tables.map(|t| serde_json::to_string(t).unwrap_or_else(|_| "[]".into()))
}

/// Parse a stored table list
pub(crate) fn tables_from_json(raw: Option<String>) -> Option<Vec<String>> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}
