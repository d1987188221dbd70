// ABOUTME: SMS MFA enrollment database operations
// ABOUTME: One row per (user, method); enabled=false is the pending state

use super::Database;
use crate::models::MfaEnrollment;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_mfa(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mfa_enrollments (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                method TEXT NOT NULL DEFAULT 'sms',
                phone TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT 0,
                enrolled_at DATETIME,
                created_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, method)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a user's SMS enrollment; absence is the `none` state
    pub async fn get_mfa_enrollment(
        &self,
        user_id: Uuid,
    ) -> Result<Option<MfaEnrollment>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM mfa_enrollments WHERE user_id = $1 AND method = 'sms'",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(MfaEnrollment {
                user_id,
                phone: row.try_get("phone")?,
                enabled: row.try_get("enabled")?,
                enrolled_at: row.try_get("enrolled_at")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    /// Start or restart a pending enrollment. Re-enrolling while pending
    /// replaces the phone and resets confirmation state.
    pub async fn upsert_pending_mfa_enrollment(
        &self,
        user_id: Uuid,
        phone: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO mfa_enrollments (user_id, method, phone, enabled, enrolled_at, created_at)
            VALUES ($1, 'sms', $2, 0, NULL, $3)
            ON CONFLICT (user_id, method) DO UPDATE SET
                phone = excluded.phone,
                enabled = 0,
                enrolled_at = NULL
            ",
        )
        .bind(user_id.to_string())
        .bind(phone)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip a pending enrollment to enabled. Returns false when there was no
    /// pending row to confirm.
    pub async fn enable_mfa_enrollment(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE mfa_enrollments SET enabled = 1, enrolled_at = $1
            WHERE user_id = $2 AND method = 'sms' AND enabled = 0
            ",
        )
        .bind(Utc::now())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
