// ABOUTME: API key database operations
// ABOUTME: Hash-keyed lookup joined with the owning user and app rate limits

use super::{tables_from_json, Database};
use crate::models::ApiKey;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// An API key resolved for authentication, joined with the context the
/// claims model needs
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    /// The key row
    pub key: ApiKey,
    /// Owning user's email
    pub email: String,
    /// Owning app's rate limit, when the key belongs to an unrevoked app
    pub app_rate_limit_rps: Option<i64>,
    /// Owning app's rate limit window in seconds
    pub app_rate_limit_window_seconds: Option<i64>,
}

fn row_to_api_key(row: &SqliteRow) -> Result<ApiKey, sqlx::Error> {
    let app_id: Option<String> = row.try_get("app_id")?;
    Ok(ApiKey {
        id: super::users::parse_uuid(row, "id")?,
        user_id: super::users::parse_uuid(row, "user_id")?,
        name: row.try_get("name")?,
        key_hash: row.try_get("key_hash")?,
        key_prefix: row.try_get("key_prefix")?,
        scope: row.try_get("scope")?,
        allowed_tables: tables_from_json(row.try_get("allowed_tables")?).unwrap_or_default(),
        app_id: app_id.and_then(|raw| Uuid::parse_str(&raw).ok()),
        last_used_at: row.try_get("last_used_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    pub(super) async fn migrate_api_keys(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                key_prefix TEXT NOT NULL,
                scope TEXT NOT NULL DEFAULT '*',
                allowed_tables TEXT NOT NULL DEFAULT '[]',
                app_id TEXT REFERENCES apps(id) ON DELETE RESTRICT,
                last_used_at DATETIME,
                expires_at DATETIME,
                revoked_at DATETIME,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_user_id ON api_keys(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new API key
    pub async fn create_api_key(&self, key: &ApiKey) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO api_keys
                (id, user_id, name, key_hash, key_prefix, scope, allowed_tables,
                 app_id, last_used_at, expires_at, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9, NULL, $10)
            ",
        )
        .bind(key.id.to_string())
        .bind(key.user_id.to_string())
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(&key.scope)
        .bind(serde_json::to_string(&key.allowed_tables).unwrap_or_else(|_| "[]".into()))
        .bind(key.app_id.map(|id| id.to_string()))
        .bind(key.expires_at)
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve an unrevoked key by hash for authentication, joining the
    /// owner's email and the app's rate limits. Expiry is the caller's check.
    pub async fn get_api_key_for_auth(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKeyAuth>, sqlx::Error> {
        let row = sqlx::query(
            r"
            SELECT k.*, u.email AS owner_email,
                   a.rate_limit_rps AS app_rps, a.rate_limit_window_seconds AS app_window
            FROM api_keys k
            JOIN users u ON u.id = k.user_id
            LEFT JOIN apps a ON a.id = k.app_id AND a.revoked_at IS NULL
            WHERE k.key_hash = $1 AND k.revoked_at IS NULL
            ",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ApiKeyAuth {
                key: row_to_api_key(&row)?,
                email: row.try_get("owner_email")?,
                app_rate_limit_rps: row.try_get("app_rps")?,
                app_rate_limit_window_seconds: row.try_get("app_window")?,
            })
        })
        .transpose()
    }

    /// List a user's keys, newest first, revoked keys excluded
    pub async fn list_api_keys_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, sqlx::Error> {
        sqlx::query(
            "SELECT * FROM api_keys WHERE user_id = $1 AND revoked_at IS NULL
             ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_api_key)
        .collect()
    }

    /// Revoke a key owned by the given user. Returns false when no live key
    /// matched.
    pub async fn revoke_api_key(&self, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE api_keys SET revoked_at = $1
             WHERE id = $2 AND user_id = $3 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Best-effort last-used stamp; callers spawn this off the request path
    pub async fn touch_api_key_last_used(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
