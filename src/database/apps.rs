// ABOUTME: App database operations
// ABOUTME: Apps group OAuth clients and API keys and carry rate-limit configuration

use super::Database;
use crate::models::App;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn row_to_app(row: &SqliteRow) -> Result<App, sqlx::Error> {
    Ok(App {
        id: super::users::parse_uuid(row, "id")?,
        user_id: super::users::parse_uuid(row, "user_id")?,
        name: row.try_get("name")?,
        rate_limit_rps: row.try_get("rate_limit_rps")?,
        rate_limit_window_seconds: row.try_get("rate_limit_window_seconds")?,
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    pub(super) async fn migrate_apps(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS apps (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                rate_limit_rps INTEGER,
                rate_limit_window_seconds INTEGER,
                revoked_at DATETIME,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_apps_user_id ON apps(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new app
    pub async fn create_app(&self, app: &App) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO apps (id, user_id, name, rate_limit_rps, rate_limit_window_seconds, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, NULL, $6)
            ",
        )
        .bind(app.id.to_string())
        .bind(app.user_id.to_string())
        .bind(&app.name)
        .bind(app.rate_limit_rps)
        .bind(app.rate_limit_window_seconds)
        .bind(app.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up an app by id
    pub async fn get_app(&self, id: Uuid) -> Result<Option<App>, sqlx::Error> {
        sqlx::query("SELECT * FROM apps WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_app(&row))
            .transpose()
    }

    /// List a user's apps, newest first
    pub async fn list_apps_for_user(&self, user_id: Uuid) -> Result<Vec<App>, sqlx::Error> {
        sqlx::query("SELECT * FROM apps WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_app)
            .collect()
    }
}
