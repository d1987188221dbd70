// ABOUTME: User management database operations
// ABOUTME: Registration, lookup by case-folded email, and transactional account deletion

use super::Database;
use crate::models::User;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn row_to_user(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: parse_uuid(row, "id")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        password_hash: row.try_get("password_hash")?,
        email_verified: row.try_get("email_verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_owned(),
        source: Box::new(e),
    })
}

impl Database {
    pub(super) async fn migrate_users(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                phone TEXT,
                password_hash TEXT NOT NULL,
                email_verified BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Case-folded uniqueness: emails are stored case-preserved but
        // compared via LOWER(email)
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_lower ON users(LOWER(email))",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new user. A unique violation on the email index surfaces as
    /// `sqlx::Error::Database` with `is_unique_violation()`.
    pub async fn create_user(&self, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, phone, password_hash, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a user by email, case-folded
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_user(&row))
            .transpose()
    }

    /// Look up a user by id
    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_user(&row))
            .transpose()
    }

    /// Look up a user by phone
    pub async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_user(&row))
            .transpose()
    }

    /// Replace a user's password hash (registration upgrade or reset)
    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a user's email as verified
    pub async fn set_email_verified(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET email_verified = 1, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bind a phone number to a user
    pub async fn set_user_phone(&self, user_id: Uuid, phone: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET phone = $1, updated_at = $2 WHERE id = $3")
            .bind(phone)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a user and everything hanging off the account, in one
    /// transaction.
    ///
    /// Apps owned by the user are revoked first and API keys referencing
    /// them are detached (the key → app reference is `ON DELETE RESTRICT`,
    /// so the cascade would otherwise be rejected). OAuth tokens minted
    /// under those apps' clients are revoked, and grants where this user is
    /// the resource owner are removed. The final user delete cascades to
    /// sessions, the user's own API keys, apps, and their clients.
    ///
    /// Returns false when the user does not exist.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let id = user_id.to_string();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM users WHERE id = $1")
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Ok(false);
        }

        sqlx::query("UPDATE apps SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE api_keys SET app_id = NULL
             WHERE app_id IN (SELECT id FROM apps WHERE user_id = $1)",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE oauth_tokens SET revoked_at = $1
            WHERE revoked_at IS NULL
              AND client_id IN (
                  SELECT client_id FROM oauth_clients
                  WHERE app_id IN (SELECT id FROM apps WHERE user_id = $2)
              )
            ",
        )
        .bind(now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        // Grants where the deleted user is the resource owner
        sqlx::query("UPDATE oauth_tokens SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM oauth_authorization_codes WHERE user_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM oauth_consents WHERE user_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
