// ABOUTME: OAuth 2.1 authorization server endpoints: authorize, consent, token, revoke
// ABOUTME: Code exchange and refresh rotation are transactions over guarded updates

use super::clients::{ClientCredentials, ClientManager};
use super::models::{
    AuthorizeParams, ClientType, ConsentPromptResponse, OAuthAuthorizationCode, OAuthClient,
    OAuthConsent, OAuthError, OAuthToken, OAuthTokenInfo, OAuthTokenType, TokenRequest,
    TokenResponse,
};
use crate::constants::{durations, limits};
use crate::credentials::{generate_oauth_access_token, generate_oauth_refresh_token};
use crate::crypto;
use crate::database::Database;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Compute an S256 PKCE challenge from a verifier
#[must_use]
pub fn generate_pkce_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time S256 verification of a code verifier against a stored
/// challenge
#[must_use]
pub fn verify_pkce(verifier: &str, challenge: &str) -> bool {
    let computed = generate_pkce_challenge(verifier);
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}

/// A fully validated authorize request, ready for consent or code minting
#[derive(Debug, Clone)]
pub struct ValidatedAuthorize {
    pub client: OAuthClient,
    pub redirect_uri: String,
    pub scope: String,
    pub allowed_tables: Option<Vec<String>>,
    pub state: String,
    pub code_challenge: String,
}

/// Outcome of an authorize request for an authenticated end-user
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Stored consent does not cover the request; the prompt payload echoes
    /// every original parameter
    ConsentRequired(Box<ConsentPromptResponse>),
    /// Consent covered; redirect to the client with code and state
    Redirect(String),
}

/// The authorization server
pub struct OAuth2Provider {
    database: Arc<Database>,
    clients: ClientManager,
}

impl OAuth2Provider {
    #[must_use]
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            clients: ClientManager::new(database.clone()),
            database,
        }
    }

    /// Access the client manager
    #[must_use]
    pub const fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Validate an authorize request. The first failing check determines the
    /// error; the order is fixed so clients see stable diagnostics.
    pub async fn validate_authorize(
        &self,
        params: &AuthorizeParams,
    ) -> Result<ValidatedAuthorize, OAuthError> {
        match params.response_type.as_deref() {
            Some("code") => {}
            Some(_) => {
                return Err(OAuthError::invalid_request(
                    "response_type must be 'code'",
                ))
            }
            None => return Err(OAuthError::invalid_request("response_type is required")),
        }
        let client_id = params
            .client_id
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
        let redirect_uri = params
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;
        let scope = params
            .scope
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("scope is required"))?;
        let state = params
            .state
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("state is required"))?;
        let code_challenge = params
            .code_challenge
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code_challenge is required"))?;
        match params.code_challenge_method.as_deref() {
            Some("S256") => {}
            _ => {
                return Err(OAuthError::invalid_request(
                    "code_challenge_method must be 'S256'",
                ))
            }
        }

        let client = self
            .database
            .get_oauth_client(client_id)
            .await
            .map_err(|e| {
                tracing::error!("client lookup failed: {e}");
                OAuthError::server_error()
            })?
            .ok_or_else(|| OAuthError::invalid_client("unknown client"))?;
        if client.revoked_at.is_some() {
            return Err(OAuthError::invalid_client("client revoked"));
        }

        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            return Err(OAuthError::invalid_request("redirect_uri not registered"));
        }
        if !client.scopes.iter().any(|allowed| allowed == scope) {
            return Err(OAuthError::invalid_scope(
                "requested scope exceeds the client's allowed scopes",
            ));
        }

        Ok(ValidatedAuthorize {
            redirect_uri: redirect_uri.to_owned(),
            scope: scope.to_owned(),
            allowed_tables: parse_tables_csv(params.allowed_tables.as_deref()),
            state: state.to_owned(),
            code_challenge: code_challenge.to_owned(),
            client,
        })
    }

    /// Authorize for an authenticated end-user: consult stored consent and
    /// either prompt or mint a code and redirect.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        params: &AuthorizeParams,
    ) -> Result<AuthorizeOutcome, OAuthError> {
        let validated = self.validate_authorize(params).await?;

        let consent = self
            .database
            .get_consent(user_id, &validated.client.client_id)
            .await
            .map_err(|e| {
                tracing::error!("consent lookup failed: {e}");
                OAuthError::server_error()
            })?;

        let covered = consent.is_some_and(|stored| {
            stored.covers(&validated.scope, validated.allowed_tables.as_deref())
        });

        if covered {
            let url = self.mint_code_redirect(user_id, &validated).await?;
            Ok(AuthorizeOutcome::Redirect(url))
        } else {
            Ok(AuthorizeOutcome::ConsentRequired(Box::new(
                ConsentPromptResponse {
                    requires_consent: true,
                    client_id: validated.client.client_id,
                    client_name: validated.client.name,
                    response_type: "code".into(),
                    redirect_uri: validated.redirect_uri,
                    scope: validated.scope,
                    state: validated.state,
                    code_challenge: validated.code_challenge,
                    code_challenge_method: "S256".into(),
                    allowed_tables: params.allowed_tables.clone(),
                },
            )))
        }
    }

    /// Record a consent decision. Deny redirects back with `access_denied`;
    /// approve re-validates, stores the consent, and mints a code.
    pub async fn consent(
        &self,
        user_id: Uuid,
        decision: &str,
        params: &AuthorizeParams,
    ) -> Result<String, OAuthError> {
        let validated = self.validate_authorize(params).await?;

        match decision {
            "approve" => {
                self.database
                    .upsert_consent(&OAuthConsent {
                        user_id,
                        client_id: validated.client.client_id.clone(),
                        scope: validated.scope.clone(),
                        allowed_tables: validated.allowed_tables.clone(),
                        granted_at: Utc::now(),
                    })
                    .await
                    .map_err(|e| {
                        tracing::error!("consent upsert failed: {e}");
                        OAuthError::server_error()
                    })?;
                self.mint_code_redirect(user_id, &validated).await
            }
            "deny" => Ok(format!(
                "{}?error=access_denied&state={}",
                validated.redirect_uri,
                urlencoding::encode(&validated.state)
            )),
            _ => Err(OAuthError::invalid_request(
                "decision must be 'approve' or 'deny'",
            )),
        }
    }

    async fn mint_code_redirect(
        &self,
        user_id: Uuid,
        validated: &ValidatedAuthorize,
    ) -> Result<String, OAuthError> {
        let code = crypto::random_hex(64);
        let row = OAuthAuthorizationCode {
            id: Uuid::new_v4(),
            code_hash: crypto::sha256_hex(&code),
            client_id: validated.client.client_id.clone(),
            user_id,
            redirect_uri: validated.redirect_uri.clone(),
            scope: validated.scope.clone(),
            allowed_tables: validated.allowed_tables.clone(),
            code_challenge: validated.code_challenge.clone(),
            code_challenge_method: "S256".into(),
            state: validated.state.clone(),
            expires_at: Utc::now() + Duration::minutes(durations::AUTH_CODE_MINUTES),
            used_at: None,
            created_at: Utc::now(),
        };
        self.database.store_auth_code(&row).await.map_err(|e| {
            tracing::error!("failed to store authorization code: {e}");
            OAuthError::server_error()
        })?;

        tracing::info!(
            client_id = %validated.client.client_id,
            %user_id,
            scope = %validated.scope,
            "minted authorization code"
        );

        Ok(format!(
            "{}?code={}&state={}",
            validated.redirect_uri,
            code,
            urlencoding::encode(&validated.state)
        ))
    }

    /// Token endpoint dispatch. The caller has already enforced the
    /// form-encoding requirement and extracted client credentials.
    pub async fn token(
        &self,
        credentials: ClientCredentials,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => self.authorization_code_grant(credentials, request).await,
            Some("client_credentials") => self.client_credentials_grant(credentials, request).await,
            Some("refresh_token") => self.refresh_token_grant(credentials, request).await,
            Some(_) => Err(OAuthError::unsupported_grant_type()),
            None => Err(OAuthError::invalid_request("grant_type is required")),
        }
    }

    /// Exchange a single-use authorization code for a token pair.
    ///
    /// The whole exchange runs in one transaction: validate against the
    /// fetched row, verify PKCE, then stamp `used_at` with a
    /// `used_at IS NULL` guard. A lost guard race fails the exchange, and a
    /// PKCE failure rolls back without consuming the code.
    async fn authorization_code_grant(
        &self,
        credentials: ClientCredentials,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;
        let verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;

        let client = self.clients.authenticate(&credentials).await?;

        if verifier.len() < limits::PKCE_VERIFIER_MIN || verifier.len() > limits::PKCE_VERIFIER_MAX
        {
            return Err(OAuthError::invalid_grant(
                "code_verifier must be between 43 and 128 characters",
            ));
        }

        let mut tx = self.database.begin().await.map_err(db_error)?;

        let row = self
            .database
            .get_auth_code_tx(&mut tx, &crypto::sha256_hex(code))
            .await
            .map_err(db_error)?
            .ok_or_else(|| OAuthError::invalid_grant("invalid authorization code"))?;

        if row.used_at.is_some() {
            return Err(OAuthError::invalid_grant("authorization code already used"));
        }
        if row.expires_at <= Utc::now() {
            return Err(OAuthError::invalid_grant("authorization code expired"));
        }
        if row.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "authorization code was issued to another client",
            ));
        }
        if row.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
        }
        if !verify_pkce(verifier, &row.code_challenge) {
            // dropping the transaction rolls back; the code stays unconsumed
            return Err(OAuthError::invalid_grant("invalid code_verifier"));
        }

        let consumed = self
            .database
            .mark_auth_code_used_tx(&mut tx, row.id)
            .await
            .map_err(db_error)?;
        if !consumed {
            return Err(OAuthError::invalid_grant("authorization code already used"));
        }

        let grant_id = Uuid::new_v4();
        let (access_token, refresh_token) = self
            .insert_token_pair(
                &mut tx,
                &client.client_id,
                Some(row.user_id),
                &row.scope,
                row.allowed_tables.as_deref(),
                grant_id,
            )
            .await?;

        tx.commit().await.map_err(db_error)?;

        tracing::info!(
            client_id = %client.client_id,
            user_id = %row.user_id,
            %grant_id,
            "exchanged authorization code"
        );

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: durations::OAUTH_ACCESS_TOKEN_SECS,
            refresh_token: Some(refresh_token),
            scope: row.scope,
        })
    }

    /// Client-credentials grant: confidential clients only, no refresh token
    async fn client_credentials_grant(
        &self,
        credentials: ClientCredentials,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let scope = request
            .scope
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("scope is required"))?;

        let client = self.clients.authenticate(&credentials).await?;
        if client.client_type != ClientType::Confidential {
            return Err(OAuthError::unauthorized_client(
                "public clients may not use the client_credentials grant",
            ));
        }
        if !client.scopes.iter().any(|allowed| allowed == scope) {
            return Err(OAuthError::invalid_scope(
                "requested scope exceeds the client's allowed scopes",
            ));
        }

        let access_token = generate_oauth_access_token();
        let now = Utc::now();
        let mut tx = self.database.begin().await.map_err(db_error)?;
        self.database
            .insert_oauth_token_tx(
                &mut tx,
                &OAuthToken {
                    id: Uuid::new_v4(),
                    token_hash: crypto::sha256_hex(&access_token),
                    token_type: OAuthTokenType::Access,
                    client_id: client.client_id.clone(),
                    user_id: None,
                    scope: scope.to_owned(),
                    allowed_tables: None,
                    grant_id: Uuid::new_v4(),
                    expires_at: now + Duration::seconds(durations::OAUTH_ACCESS_TOKEN_SECS),
                    revoked_at: None,
                    created_at: now,
                },
            )
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: durations::OAUTH_ACCESS_TOKEN_SECS,
            refresh_token: None,
            scope: scope.to_owned(),
        })
    }

    /// Rotate a refresh token. Reuse of an already-rotated token is replay:
    /// every token sharing the grant is revoked and the caller gets a theft
    /// description.
    async fn refresh_token_grant(
        &self,
        credentials: ClientCredentials,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let presented = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;

        let client = self.clients.authenticate(&credentials).await?;

        let mut tx = self.database.begin().await.map_err(db_error)?;

        let row = self
            .database
            .get_refresh_token_tx(&mut tx, &crypto::sha256_hex(presented))
            .await
            .map_err(db_error)?
            .ok_or_else(|| OAuthError::invalid_grant("invalid refresh token"))?;

        if row.revoked_at.is_some() {
            let swept = self
                .database
                .revoke_grant_tx(&mut tx, row.grant_id)
                .await
                .map_err(db_error)?;
            tx.commit().await.map_err(db_error)?;
            tracing::warn!(
                client_id = %client.client_id,
                grant_id = %row.grant_id,
                swept,
                "rotated refresh token replayed; grant revoked"
            );
            return Err(OAuthError::invalid_grant(
                "refresh token reused - possible token theft, grant revoked",
            ));
        }
        if row.expires_at <= Utc::now() {
            return Err(OAuthError::invalid_grant("refresh token expired"));
        }
        if row.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "refresh token was issued to another client",
            ));
        }

        let rotated = self
            .database
            .revoke_oauth_token_tx(&mut tx, row.id)
            .await
            .map_err(db_error)?;
        if !rotated {
            // a concurrent rotation won the guard race: treat as replay
            let swept = self
                .database
                .revoke_grant_tx(&mut tx, row.grant_id)
                .await
                .map_err(db_error)?;
            tx.commit().await.map_err(db_error)?;
            tracing::warn!(
                client_id = %client.client_id,
                grant_id = %row.grant_id,
                swept,
                "concurrent refresh rotation detected; grant revoked"
            );
            return Err(OAuthError::invalid_grant(
                "refresh token reused - possible token theft, grant revoked",
            ));
        }

        let (access_token, refresh_token) = self
            .insert_token_pair(
                &mut tx,
                &client.client_id,
                row.user_id,
                &row.scope,
                row.allowed_tables.as_deref(),
                row.grant_id,
            )
            .await?;

        tx.commit().await.map_err(db_error)?;

        tracing::info!(
            client_id = %client.client_id,
            grant_id = %row.grant_id,
            "rotated refresh token"
        );

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: durations::OAUTH_ACCESS_TOKEN_SECS,
            refresh_token: Some(refresh_token),
            scope: row.scope,
        })
    }

    async fn insert_token_pair(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        client_id: &str,
        user_id: Option<Uuid>,
        scope: &str,
        allowed_tables: Option<&[String]>,
        grant_id: Uuid,
    ) -> Result<(String, String), OAuthError> {
        let access_token = generate_oauth_access_token();
        let refresh_token = generate_oauth_refresh_token();
        let now = Utc::now();
        let tables = allowed_tables.map(<[String]>::to_vec);

        self.database
            .insert_oauth_token_tx(
                tx,
                &OAuthToken {
                    id: Uuid::new_v4(),
                    token_hash: crypto::sha256_hex(&access_token),
                    token_type: OAuthTokenType::Access,
                    client_id: client_id.to_owned(),
                    user_id,
                    scope: scope.to_owned(),
                    allowed_tables: tables.clone(),
                    grant_id,
                    expires_at: now + Duration::seconds(durations::OAUTH_ACCESS_TOKEN_SECS),
                    revoked_at: None,
                    created_at: now,
                },
            )
            .await
            .map_err(db_error)?;

        self.database
            .insert_oauth_token_tx(
                tx,
                &OAuthToken {
                    id: Uuid::new_v4(),
                    token_hash: crypto::sha256_hex(&refresh_token),
                    token_type: OAuthTokenType::Refresh,
                    client_id: client_id.to_owned(),
                    user_id,
                    scope: scope.to_owned(),
                    allowed_tables: tables,
                    grant_id,
                    expires_at: now + Duration::days(durations::OAUTH_REFRESH_TOKEN_DAYS),
                    revoked_at: None,
                    created_at: now,
                },
            )
            .await
            .map_err(db_error)?;

        Ok((access_token, refresh_token))
    }

    /// RFC 7009 revocation. Resolving a refresh token revokes its whole
    /// grant; an access token revokes just itself; an unknown token is a
    /// silent success so existence is not leaked.
    pub async fn revoke(&self, token: &str) -> Result<(), OAuthError> {
        let row = self
            .database
            .find_oauth_token_by_hash(&crypto::sha256_hex(token))
            .await
            .map_err(db_error)?;

        match row {
            Some(row) if row.token_type == OAuthTokenType::Refresh => {
                let swept = self.database.revoke_grant(row.grant_id).await.map_err(db_error)?;
                tracing::info!(grant_id = %row.grant_id, swept, "revoked refresh token grant");
            }
            Some(row) => {
                self.database.revoke_oauth_token(row.id).await.map_err(db_error)?;
                tracing::info!(client_id = %row.client_id, "revoked access token");
            }
            None => {}
        }
        Ok(())
    }

    /// Validate an opaque access token for the credential router
    pub async fn validate_access_token(
        &self,
        plaintext: &str,
    ) -> Result<Option<OAuthTokenInfo>, sqlx::Error> {
        self.database
            .validate_oauth_access_token(&crypto::sha256_hex(plaintext), Utc::now())
            .await
    }
}

fn db_error(e: sqlx::Error) -> OAuthError {
    tracing::error!("oauth database operation failed: {e}");
    OAuthError::server_error()
}

/// Parse the CSV `allowed_tables` parameter; an absent or empty parameter
/// records no restriction.
fn parse_tables_csv(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?;
    let tables: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();
    (!tables.is_empty()).then_some(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 appendix B test vector
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn pkce_matches_rfc_vector() {
        assert_eq!(generate_pkce_challenge(VERIFIER), CHALLENGE);
        assert!(verify_pkce(VERIFIER, CHALLENGE));
    }

    #[test]
    fn pkce_rejects_other_verifiers() {
        assert!(!verify_pkce("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", CHALLENGE));
    }

    #[test]
    fn tables_csv_parsing() {
        assert_eq!(parse_tables_csv(None), None);
        assert_eq!(parse_tables_csv(Some("")), None);
        assert_eq!(
            parse_tables_csv(Some("orders, users")),
            Some(vec!["orders".to_owned(), "users".to_owned()])
        );
    }
}
