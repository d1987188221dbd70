// ABOUTME: OAuth client registration, redirect URI validation, and client authentication
// ABOUTME: Secrets are stored as SHA-256 digests and compared in constant time

use super::models::{ClientType, OAuthClient, OAuthError, TokenRequest};
use crate::credentials::{
    self, generate_oauth_client_id, generate_oauth_client_secret, SCOPE_ALL, SCOPE_READONLY,
    SCOPE_READWRITE,
};
use crate::crypto;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use url::Url;
use uuid::Uuid;

/// Credentials presented at the token endpoint, from exactly one source
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Extract client credentials from Basic auth or the form body. Presenting
/// both is an `invalid_request`; presenting neither is an `invalid_client`.
pub fn extract_client_credentials(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<ClientCredentials, OAuthError> {
    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .map(parse_basic_credentials)
        .transpose()?;

    let form_present = request.client_id.is_some() || request.client_secret.is_some();

    match (basic, form_present) {
        (Some(_), true) => Err(OAuthError::invalid_request(
            "client credentials must be sent via Basic auth or the request body, not both",
        )),
        (Some(credentials), false) => Ok(credentials),
        (None, true) => {
            let client_id = request.client_id.clone().ok_or_else(|| {
                OAuthError::invalid_client("client_id is required")
            })?;
            Ok(ClientCredentials {
                client_id,
                client_secret: request.client_secret.clone(),
            })
        }
        (None, false) => Err(OAuthError::invalid_client("client authentication required")),
    }
}

fn parse_basic_credentials(encoded: &str) -> Result<ClientCredentials, OAuthError> {
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| OAuthError::invalid_request("malformed Basic authorization header"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| OAuthError::invalid_request("malformed Basic authorization header"))?;
    let (id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| OAuthError::invalid_request("malformed Basic authorization header"))?;

    let client_id = urlencoding::decode(id)
        .map_err(|_| OAuthError::invalid_request("malformed Basic authorization header"))?
        .into_owned();
    let client_secret = urlencoding::decode(secret)
        .map_err(|_| OAuthError::invalid_request("malformed Basic authorization header"))?
        .into_owned();

    Ok(ClientCredentials {
        client_id,
        client_secret: (!client_secret.is_empty()).then_some(client_secret),
    })
}

/// Validate one redirect URI at registration time: HTTPS or localhost HTTP,
/// no query, no fragment, no wildcard. Matching at authorize time is exact
/// string comparison against this registered value.
pub fn validate_redirect_uri(uri: &str) -> Result<(), String> {
    let parsed = Url::parse(uri).map_err(|e| format!("invalid redirect URI: {e}"))?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            let host = parsed.host_str().unwrap_or_default();
            if !matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
                return Err("http redirect URIs are only allowed for localhost".into());
            }
        }
        other => return Err(format!("unsupported redirect URI scheme: {other}")),
    }

    if parsed.query().is_some() {
        return Err("redirect URIs must not carry a query string".into());
    }
    if parsed.fragment().is_some() {
        return Err("redirect URIs must not carry a fragment".into());
    }
    if uri.contains('*') {
        return Err("redirect URIs must not contain wildcards".into());
    }
    Ok(())
}

/// Request to register a relying party under one of the caller's apps
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterClientRequest {
    /// Owning app id
    pub app_id: String,
    /// Display name
    pub name: String,
    /// Exact-match redirect URIs
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request
    pub scopes: Vec<String>,
    /// `confidential` (default) or `public`
    #[serde(default)]
    pub client_type: Option<String>,
}

/// Client lifecycle manager
pub struct ClientManager {
    database: Arc<Database>,
}

impl ClientManager {
    #[must_use]
    pub const fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Register a client. Returns the stored row and, for confidential
    /// clients, the plaintext secret shown exactly once.
    pub async fn register(
        &self,
        user_id: Uuid,
        request: RegisterClientRequest,
    ) -> AppResult<(OAuthClient, Option<String>)> {
        let app_id = Uuid::parse_str(&request.app_id)
            .map_err(|_| AppError::validation("app_id must be a UUID"))?;
        let app = self
            .database
            .get_app(app_id)
            .await?
            .ok_or_else(|| AppError::not_found("app"))?;
        if app.user_id != user_id {
            return Err(AppError::not_found("app"));
        }
        if app.revoked_at.is_some() {
            return Err(AppError::validation("app is revoked"));
        }

        if request.name.trim().is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }
        if request.redirect_uris.is_empty() {
            return Err(AppError::validation("at least one redirect URI is required"));
        }
        for uri in &request.redirect_uris {
            validate_redirect_uri(uri).map_err(AppError::validation)?;
        }
        if request.scopes.is_empty() {
            return Err(AppError::validation("at least one scope is required"));
        }
        for scope in &request.scopes {
            if !matches!(scope.as_str(), SCOPE_ALL | SCOPE_READONLY | SCOPE_READWRITE) {
                return Err(AppError::validation(format!("unknown scope: {scope}")));
            }
        }

        let client_type = match request.client_type.as_deref() {
            None | Some("confidential") => ClientType::Confidential,
            Some("public") => ClientType::Public,
            Some(other) => {
                return Err(AppError::validation(format!("unknown client type: {other}")))
            }
        };

        let secret = matches!(client_type, ClientType::Confidential)
            .then(generate_oauth_client_secret);

        let client = OAuthClient {
            id: Uuid::new_v4(),
            app_id,
            client_id: generate_oauth_client_id(),
            client_secret_hash: secret.as_deref().map(crypto::sha256_hex),
            name: request.name,
            redirect_uris: request.redirect_uris,
            scopes: request.scopes,
            client_type,
            revoked_at: None,
            created_at: Utc::now(),
        };

        self.database.create_oauth_client(&client).await?;
        tracing::info!(client_id = %client.client_id, app_id = %app_id, "registered OAuth client");
        Ok((client, secret))
    }

    /// Authenticate a client at the token/revoke endpoints.
    ///
    /// Confidential clients must present their secret; public clients must
    /// not. A revoked client authenticates as `invalid_client` with a
    /// revocation description, distinct from an unknown client.
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, OAuthError> {
        if !credentials::is_oauth_client_id(&credentials.client_id) {
            return Err(OAuthError::invalid_client("unknown client"));
        }

        let client = self
            .database
            .get_oauth_client(&credentials.client_id)
            .await
            .map_err(|e| {
                tracing::error!("client lookup failed: {e}");
                OAuthError::server_error()
            })?
            .ok_or_else(|| OAuthError::invalid_client("unknown client"))?;

        if client.revoked_at.is_some() {
            return Err(OAuthError::invalid_client("client revoked"));
        }

        match (client.client_type, &credentials.client_secret) {
            (ClientType::Confidential, Some(secret)) => {
                let stored = client
                    .client_secret_hash
                    .as_deref()
                    .ok_or_else(|| OAuthError::invalid_client("client authentication failed"))?;
                let presented = crypto::sha256_hex(secret);
                if presented.as_bytes().ct_eq(stored.as_bytes()).into() {
                    Ok(client)
                } else {
                    Err(OAuthError::invalid_client("client authentication failed"))
                }
            }
            (ClientType::Confidential, None) => {
                Err(OAuthError::invalid_client("client secret required"))
            }
            (ClientType::Public, None) => Ok(client),
            (ClientType::Public, Some(_)) => {
                Err(OAuthError::invalid_client("public clients have no secret"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_rules() {
        assert!(validate_redirect_uri("https://client.example.com/callback").is_ok());
        assert!(validate_redirect_uri("http://localhost:3000/cb").is_ok());
        assert!(validate_redirect_uri("http://127.0.0.1:8000/cb").is_ok());

        assert!(validate_redirect_uri("http://client.example.com/callback").is_err());
        assert!(validate_redirect_uri("https://example.com/cb?next=1").is_err());
        assert!(validate_redirect_uri("https://example.com/cb#frag").is_err());
        assert!(validate_redirect_uri("https://*.example.com/cb").is_err());
        assert!(validate_redirect_uri("ftp://example.com/cb").is_err());
    }

    #[test]
    fn basic_credentials_parse() {
        let encoded = general_purpose::STANDARD.encode("ayb_cid_abc:topsecret");
        let creds = parse_basic_credentials(&encoded).unwrap();
        assert_eq!(creds.client_id, "ayb_cid_abc");
        assert_eq!(creds.client_secret.as_deref(), Some("topsecret"));

        assert!(parse_basic_credentials("not-base64!!").is_err());
    }

    #[test]
    fn both_credential_sources_is_invalid_request() {
        let mut headers = HeaderMap::new();
        let encoded = general_purpose::STANDARD.encode("ayb_cid_abc:secret");
        headers.insert(
            AUTHORIZATION,
            format!("Basic {encoded}").parse().unwrap(),
        );
        let request = TokenRequest {
            grant_type: Some("authorization_code".into()),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            client_id: Some("ayb_cid_abc".into()),
            client_secret: None,
            scope: None,
            refresh_token: None,
        };
        let err = extract_client_credentials(&headers, &request).unwrap_err();
        assert_eq!(err.error, "invalid_request");
    }
}
