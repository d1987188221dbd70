// ABOUTME: SMS OTP persistence: pending codes and per-day counters
// ABOUTME: Code consumption is a single DELETE ... RETURNING statement

use super::Database;
use crate::models::{SmsCode, SmsDailyStats};
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn row_to_code(row: &SqliteRow) -> Result<SmsCode, sqlx::Error> {
    Ok(SmsCode {
        id: super::users::parse_uuid(row, "id")?,
        phone: row.try_get("phone")?,
        code_hash: row.try_get("code_hash")?,
        attempts: row.try_get("attempts")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    pub(super) async fn migrate_sms(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sms_codes (
                id TEXT PRIMARY KEY,
                phone TEXT NOT NULL,
                code_hash TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                expires_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sms_codes_phone ON sms_codes(phone)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sms_daily_counts (
                date TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0,
                confirm_count INTEGER NOT NULL DEFAULT 0,
                fail_count INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Drop every code row for a phone. New issuance replaces old codes, and
    /// confirm failures clean up stragglers.
    pub async fn delete_sms_codes_for_phone(&self, phone: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sms_codes WHERE phone = $1")
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a fresh code row
    pub async fn insert_sms_code(&self, code: &SmsCode) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO sms_codes (id, phone, code_hash, attempts, expires_at, created_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            ",
        )
        .bind(code.id.to_string())
        .bind(&code.phone)
        .bind(&code.code_hash)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent live code for a phone: unexpired with attempts remaining
    pub async fn get_active_sms_code(
        &self,
        phone: &str,
        max_attempts: i64,
    ) -> Result<Option<SmsCode>, sqlx::Error> {
        sqlx::query(
            r"
            SELECT * FROM sms_codes
            WHERE phone = $1 AND expires_at > $2 AND attempts < $3
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(phone)
        .bind(Utc::now())
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row_to_code(&row))
        .transpose()
    }

    /// Count a failed attempt, returning the new attempt count
    pub async fn increment_sms_attempts(&self, id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE sms_codes SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
    }

    /// Drop one code row by id
    pub async fn delete_sms_code(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sms_codes WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomic consumption: one DELETE returning the row id. Two concurrent
    /// confirms cannot both win.
    pub async fn consume_sms_code(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let consumed =
            sqlx::query_scalar::<_, String>("DELETE FROM sms_codes WHERE id = $1 RETURNING id")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(consumed.is_some())
    }

    /// Today's counters, zeroed when no row exists yet
    pub async fn get_sms_daily_stats(&self, date: NaiveDate) -> Result<SmsDailyStats, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM sms_daily_counts WHERE date = $1")
            .bind(date.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => SmsDailyStats {
                count: row.try_get("count")?,
                confirm_count: row.try_get("confirm_count")?,
                fail_count: row.try_get("fail_count")?,
            },
            None => SmsDailyStats::default(),
        })
    }

    /// Count one issued code for the day
    pub async fn increment_sms_daily_count(&self, date: NaiveDate) -> Result<(), sqlx::Error> {
        self.bump_daily(date, "count").await
    }

    /// Count one successful verification for the day
    pub async fn increment_sms_daily_confirms(&self, date: NaiveDate) -> Result<(), sqlx::Error> {
        self.bump_daily(date, "confirm_count").await
    }

    /// Count one failed verification for the day
    pub async fn increment_sms_daily_failures(&self, date: NaiveDate) -> Result<(), sqlx::Error> {
        self.bump_daily(date, "fail_count").await
    }

    async fn bump_daily(&self, date: NaiveDate, column: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO sms_daily_counts (date, count, confirm_count, fail_count)
            VALUES ($1, 0, 0, 0)
            ON CONFLICT (date) DO NOTHING
            ",
        )
        .bind(date.to_string())
        .execute(&self.pool)
        .await?;

        // column comes from the three callers above, never from input
        let sql = format!("UPDATE sms_daily_counts SET {column} = {column} + 1 WHERE date = $1");
        sqlx::query(&sql).bind(date.to_string()).execute(&self.pool).await?;
        Ok(())
    }
}
