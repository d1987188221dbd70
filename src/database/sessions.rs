// ABOUTME: First-party refresh-session database operations
// ABOUTME: Rotation rewrites the existing row so the grant keeps its identity

use super::Database;
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_sessions(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL UNIQUE,
                expires_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist a new refresh session
    pub async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rotate a refresh session in place: replace the hash and extend the
    /// expiry on the existing unexpired row. The guard makes concurrent
    /// rotations race-safe; exactly one caller sees an affected row.
    ///
    /// Returns the owning user when rotation won, `None` when the old token
    /// was unknown, expired, or already rotated.
    pub async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r"
            UPDATE sessions SET token_hash = $1, expires_at = $2
            WHERE token_hash = $3 AND expires_at > $4
            RETURNING user_id
            ",
        )
        .bind(new_hash)
        .bind(new_expires_at)
        .bind(old_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
                index: "user_id".into(),
                source: Box::new(e),
            })
        })
        .transpose()
    }

    /// Delete a session by token hash. Idempotent: deleting an unknown hash
    /// is a no-op.
    pub async fn delete_session_by_hash(&self, token_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every session for a user (password reset, account deletion)
    pub async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
