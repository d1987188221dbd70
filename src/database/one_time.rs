// ABOUTME: Single-use token persistence for email verification, password reset, magic links
// ABOUTME: Consumption is always one DELETE ... RETURNING statement, never SELECT-then-DELETE

use super::Database;
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_one_time(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_verifications (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS password_resets (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS magic_links (
                token_hash TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                expires_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store an email-verification token
    pub async fn create_email_verification(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO email_verifications (token_hash, user_id, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(user_id.to_string())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume an email-verification token, returning its subject
    pub async fn consume_email_verification(
        &self,
        token_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.consume_user_token("email_verifications", token_hash).await
    }

    /// Store a password-reset token
    pub async fn create_password_reset(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO password_resets (token_hash, user_id, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(user_id.to_string())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume a password-reset token, returning its subject
    pub async fn consume_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.consume_user_token("password_resets", token_hash).await
    }

    /// Store a magic-link token; the subject is an email address
    pub async fn create_magic_link(
        &self,
        token_hash: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO magic_links (token_hash, email, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(email)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume a magic-link token, returning the subject email
    pub async fn consume_magic_link(
        &self,
        token_hash: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "DELETE FROM magic_links WHERE token_hash = $1 AND expires_at > $2 RETURNING email",
        )
        .bind(token_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
    }

    async fn consume_user_token(
        &self,
        table: &str,
        token_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        // table names come from the two callers above, never from input
        let sql = format!(
            "DELETE FROM {table} WHERE token_hash = $1 AND expires_at > $2 RETURNING user_id"
        );
        sqlx::query_scalar::<_, String>(&sql)
            .bind(token_hash)
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
}
