// ABOUTME: OAuth 2.1 persistence: clients, authorization codes, tokens, consents
// ABOUTME: Code consumption and refresh rotation use guarded updates inside transactions

use super::{tables_from_json, tables_to_json, Database};
use crate::oauth2::models::{
    ClientType, OAuthAuthorizationCode, OAuthClient, OAuthConsent, OAuthToken, OAuthTokenInfo,
    OAuthTokenType,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

fn row_to_client(row: &SqliteRow) -> Result<OAuthClient, sqlx::Error> {
    let client_type: String = row.try_get("client_type")?;
    let redirect_uris: String = row.try_get("redirect_uris")?;
    let scopes: String = row.try_get("scopes")?;
    Ok(OAuthClient {
        id: super::users::parse_uuid(row, "id")?,
        app_id: super::users::parse_uuid(row, "app_id")?,
        client_id: row.try_get("client_id")?,
        client_secret_hash: row.try_get("client_secret_hash")?,
        name: row.try_get("name")?,
        redirect_uris: serde_json::from_str(&redirect_uris).unwrap_or_default(),
        scopes: serde_json::from_str(&scopes).unwrap_or_default(),
        client_type: ClientType::parse(&client_type).unwrap_or(ClientType::Confidential),
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_code(row: &SqliteRow) -> Result<OAuthAuthorizationCode, sqlx::Error> {
    Ok(OAuthAuthorizationCode {
        id: super::users::parse_uuid(row, "id")?,
        code_hash: row.try_get("code_hash")?,
        client_id: row.try_get("client_id")?,
        user_id: super::users::parse_uuid(row, "user_id")?,
        redirect_uri: row.try_get("redirect_uri")?,
        scope: row.try_get("scope")?,
        allowed_tables: tables_from_json(row.try_get("allowed_tables")?),
        code_challenge: row.try_get("code_challenge")?,
        code_challenge_method: row.try_get("code_challenge_method")?,
        state: row.try_get("state")?,
        expires_at: row.try_get("expires_at")?,
        used_at: row.try_get("used_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_token(row: &SqliteRow) -> Result<OAuthToken, sqlx::Error> {
    let token_type: String = row.try_get("token_type")?;
    let user_id: Option<String> = row.try_get("user_id")?;
    Ok(OAuthToken {
        id: super::users::parse_uuid(row, "id")?,
        token_hash: row.try_get("token_hash")?,
        token_type: if token_type == "refresh" {
            OAuthTokenType::Refresh
        } else {
            OAuthTokenType::Access
        },
        client_id: row.try_get("client_id")?,
        user_id: user_id.and_then(|raw| Uuid::parse_str(&raw).ok()),
        scope: row.try_get("scope")?,
        allowed_tables: tables_from_json(row.try_get("allowed_tables")?),
        grant_id: super::users::parse_uuid(row, "grant_id")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    pub(super) async fn migrate_oauth(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_clients (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                client_id TEXT NOT NULL UNIQUE,
                client_secret_hash TEXT,
                name TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                scopes TEXT NOT NULL,
                client_type TEXT NOT NULL CHECK (client_type IN ('confidential', 'public')),
                revoked_at DATETIME,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_authorization_codes (
                id TEXT PRIMARY KEY,
                code_hash TEXT NOT NULL UNIQUE,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                allowed_tables TEXT,
                code_challenge TEXT NOT NULL,
                code_challenge_method TEXT NOT NULL CHECK (code_challenge_method = 'S256'),
                state TEXT NOT NULL,
                expires_at DATETIME NOT NULL,
                used_at DATETIME,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                id TEXT PRIMARY KEY,
                token_hash TEXT NOT NULL UNIQUE,
                token_type TEXT NOT NULL CHECK (token_type IN ('access', 'refresh')),
                client_id TEXT NOT NULL,
                user_id TEXT,
                scope TEXT NOT NULL,
                allowed_tables TEXT,
                grant_id TEXT NOT NULL,
                expires_at DATETIME NOT NULL,
                revoked_at DATETIME,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_oauth_tokens_grant_id ON oauth_tokens(grant_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_consents (
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                allowed_tables TEXT,
                granted_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, client_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Clients ─────────────────────────────────────────────────────────

    /// Insert a registered client
    pub async fn create_oauth_client(&self, client: &OAuthClient) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO oauth_clients
                (id, app_id, client_id, client_secret_hash, name, redirect_uris,
                 scopes, client_type, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9)
            ",
        )
        .bind(client.id.to_string())
        .bind(client.app_id.to_string())
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.name)
        .bind(serde_json::to_string(&client.redirect_uris).unwrap_or_else(|_| "[]".into()))
        .bind(serde_json::to_string(&client.scopes).unwrap_or_else(|_| "[]".into()))
        .bind(client.client_type.as_str())
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a client by its public id, revoked or not
    pub async fn get_oauth_client(
        &self,
        client_id: &str,
    ) -> Result<Option<OAuthClient>, sqlx::Error> {
        sqlx::query("SELECT * FROM oauth_clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_client(&row))
            .transpose()
    }

    /// List clients across the user's apps, newest first
    pub async fn list_oauth_clients_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OAuthClient>, sqlx::Error> {
        sqlx::query(
            r"
            SELECT c.* FROM oauth_clients c
            JOIN apps a ON a.id = c.app_id
            WHERE a.user_id = $1 AND c.revoked_at IS NULL
            ORDER BY c.created_at DESC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_client)
        .collect()
    }

    /// Revoke a client owned by the user. Returns false when no live client
    /// matched.
    pub async fn revoke_oauth_client(
        &self,
        client_id: &str,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE oauth_clients SET revoked_at = $1
            WHERE client_id = $2 AND revoked_at IS NULL
              AND app_id IN (SELECT id FROM apps WHERE user_id = $3)
            ",
        )
        .bind(Utc::now())
        .bind(client_id)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Authorization codes ─────────────────────────────────────────────

    /// Persist a freshly minted authorization code
    pub async fn store_auth_code(
        &self,
        code: &OAuthAuthorizationCode,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO oauth_authorization_codes
                (id, code_hash, client_id, user_id, redirect_uri, scope, allowed_tables,
                 code_challenge, code_challenge_method, state, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL, $12)
            ",
        )
        .bind(code.id.to_string())
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(code.user_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(tables_to_json(code.allowed_tables.as_deref()))
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.state)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a code row inside the exchange transaction
    pub async fn get_auth_code_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        code_hash: &str,
    ) -> Result<Option<OAuthAuthorizationCode>, sqlx::Error> {
        sqlx::query("SELECT * FROM oauth_authorization_codes WHERE code_hash = $1")
            .bind(code_hash)
            .fetch_optional(&mut **tx)
            .await?
            .map(|row| row_to_code(&row))
            .transpose()
    }

    /// Consume a code: guarded single-transition `used_at` stamp. A zero
    /// affected-row count means a concurrent exchange won the race.
    pub async fn mark_auth_code_used_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE oauth_authorization_codes SET used_at = $1 WHERE id = $2 AND used_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Tokens ──────────────────────────────────────────────────────────

    /// Insert a token row inside a transaction
    pub async fn insert_oauth_token_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        token: &OAuthToken,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO oauth_tokens
                (id, token_hash, token_type, client_id, user_id, scope, allowed_tables,
                 grant_id, expires_at, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10)
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.token_hash)
        .bind(token.token_type.as_str())
        .bind(&token.client_id)
        .bind(token.user_id.map(|id| id.to_string()))
        .bind(&token.scope)
        .bind(tables_to_json(token.allowed_tables.as_deref()))
        .bind(token.grant_id.to_string())
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Fetch a refresh-token row inside the rotation transaction
    pub async fn get_refresh_token_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        token_hash: &str,
    ) -> Result<Option<OAuthToken>, sqlx::Error> {
        sqlx::query(
            "SELECT * FROM oauth_tokens WHERE token_hash = $1 AND token_type = 'refresh'",
        )
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .await?
        .map(|row| row_to_token(&row))
        .transpose()
    }

    /// Revoke one token row with a `revoked_at IS NULL` guard. Zero affected
    /// rows means a concurrent rotation won.
    pub async fn revoke_oauth_token_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every token sharing a grant, inside a transaction. The reuse
    /// sweep after replay detection.
    pub async fn revoke_grant_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        grant_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = $1 WHERE grant_id = $2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(grant_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find any token row by plaintext hash (revoke endpoint)
    pub async fn find_oauth_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<OAuthToken>, sqlx::Error> {
        sqlx::query("SELECT * FROM oauth_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_token(&row))
            .transpose()
    }

    /// Revoke one token outside a transaction
    pub async fn revoke_oauth_token(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE oauth_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke a whole grant outside a transaction
    pub async fn revoke_grant(&self, grant_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked_at = $1 WHERE grant_id = $2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(grant_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Validate an opaque access token: unrevoked, unexpired, and its client
    /// not revoked. Joins the owner and app context for claims.
    pub async fn validate_oauth_access_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthTokenInfo>, sqlx::Error> {
        let row = sqlx::query(
            r"
            SELECT t.user_id AS token_user_id, t.client_id, t.scope, t.allowed_tables,
                   u.email AS owner_email,
                   c.app_id AS client_app_id,
                   a.rate_limit_rps AS app_rps, a.rate_limit_window_seconds AS app_window
            FROM oauth_tokens t
            JOIN oauth_clients c ON c.client_id = t.client_id AND c.revoked_at IS NULL
            JOIN apps a ON a.id = c.app_id
            LEFT JOIN users u ON u.id = t.user_id
            WHERE t.token_hash = $1
              AND t.token_type = 'access'
              AND t.revoked_at IS NULL
              AND t.expires_at > $2
            ",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let user_id: Option<String> = row.try_get("token_user_id")?;
            Ok(OAuthTokenInfo {
                user_id: user_id.and_then(|raw| Uuid::parse_str(&raw).ok()),
                email: row.try_get("owner_email")?,
                client_id: row.try_get("client_id")?,
                scope: row.try_get("scope")?,
                allowed_tables: tables_from_json(row.try_get("allowed_tables")?),
                app_id: super::users::parse_uuid(&row, "client_app_id")?,
                app_rate_limit_rps: row.try_get("app_rps")?,
                app_rate_limit_window_seconds: row.try_get("app_window")?,
            })
        })
        .transpose()
    }

    // ── Consents ────────────────────────────────────────────────────────

    /// Record or replace a user's approval for a client
    pub async fn upsert_consent(&self, consent: &OAuthConsent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO oauth_consents (user_id, client_id, scope, allowed_tables, granted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, client_id) DO UPDATE SET
                scope = excluded.scope,
                allowed_tables = excluded.allowed_tables,
                granted_at = excluded.granted_at
            ",
        )
        .bind(consent.user_id.to_string())
        .bind(&consent.client_id)
        .bind(&consent.scope)
        .bind(tables_to_json(consent.allowed_tables.as_deref()))
        .bind(consent.granted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch the stored consent for a (user, client) pair
    pub async fn get_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
    ) -> Result<Option<OAuthConsent>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM oauth_consents WHERE user_id = $1 AND client_id = $2",
        )
        .bind(user_id.to_string())
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(OAuthConsent {
                user_id,
                client_id: client_id.to_owned(),
                scope: row.try_get("scope")?,
                allowed_tables: tables_from_json(row.try_get("allowed_tables")?),
                granted_at: row.try_get("granted_at")?,
            })
        })
        .transpose()
    }
}
