// ABOUTME: OAuth 2.1 data models: persistence rows, request/response DTOs, error shape
// ABOUTME: Implements the RFC 6749 section 5.2 error body and consent coverage

use crate::credentials::scope_covers;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered client type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// Holds a secret; may use client-credentials
    Confidential,
    /// No secret; PKCE only
    Public,
}

impl ClientType {
    /// Storage form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confidential => "confidential",
            Self::Public => "public",
        }
    }

    /// Parse from storage form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confidential" => Some(Self::Confidential),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// A registered relying party under an app
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Internal id
    pub id: Uuid,
    /// Owning app
    pub app_id: Uuid,
    /// Public identifier, `ayb_cid_` + 48 hex
    pub client_id: String,
    /// SHA-256 of the client secret; absent for public clients
    pub client_secret_hash: Option<String>,
    /// Display name
    pub name: String,
    /// Exact-match redirect URI list
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request
    pub scopes: Vec<String>,
    /// Confidential or public
    pub client_type: ClientType,
    /// Revocation marker
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A one-shot authorization grant ticket
#[derive(Debug, Clone)]
pub struct OAuthAuthorizationCode {
    /// Internal id
    pub id: Uuid,
    /// SHA-256 of the code plaintext
    pub code_hash: String,
    /// Issuing client's public id
    pub client_id: String,
    /// Authorizing user
    pub user_id: Uuid,
    /// Exact redirect URI the code is bound to
    pub redirect_uri: String,
    /// Granted scope
    pub scope: String,
    /// Table restriction; `None` records no restriction
    pub allowed_tables: Option<Vec<String>>,
    /// PKCE S256 challenge
    pub code_challenge: String,
    /// Always `S256`
    pub code_challenge_method: String,
    /// Client CSRF state, required
    pub state: String,
    /// Expiry, ten minutes from issuance
    pub expires_at: DateTime<Utc>,
    /// Set exactly once on successful exchange
    pub used_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Opaque token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthTokenType {
    Access,
    Refresh,
}

impl OAuthTokenType {
    /// Storage form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// An opaque access or refresh token row
#[derive(Debug, Clone)]
pub struct OAuthToken {
    /// Internal id
    pub id: Uuid,
    /// SHA-256 of the plaintext
    pub token_hash: String,
    /// Access or refresh
    pub token_type: OAuthTokenType,
    /// Issuing client's public id
    pub client_id: String,
    /// Resource owner; `None` for client-credentials tokens
    pub user_id: Option<Uuid>,
    /// Granted scope
    pub scope: String,
    /// Table restriction
    pub allowed_tables: Option<Vec<String>>,
    /// Shared by every token minted from one authorization, across rotations
    pub grant_id: Uuid,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Revocation marker
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Stored user approval for a client
#[derive(Debug, Clone)]
pub struct OAuthConsent {
    /// Approving user
    pub user_id: Uuid,
    /// Client's public id
    pub client_id: String,
    /// Approved scope
    pub scope: String,
    /// Approved table restriction; `None` covers all tables
    pub allowed_tables: Option<Vec<String>>,
    /// Last approval time
    pub granted_at: DateTime<Utc>,
}

impl OAuthConsent {
    /// Whether this stored consent covers a new request.
    ///
    /// The scope lattice is `*` > `readwrite` > `readonly`. For tables, a
    /// stored `None` covers everything; a requested `None` (all tables)
    /// against a restricted stored list does not cover; otherwise every
    /// requested table must be in the stored list.
    #[must_use]
    pub fn covers(&self, requested_scope: &str, requested_tables: Option<&[String]>) -> bool {
        if !scope_covers(&self.scope, requested_scope) {
            return false;
        }
        match (&self.allowed_tables, requested_tables) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(stored), Some(requested)) => {
                requested.iter().all(|table| stored.contains(table))
            }
        }
    }
}

/// Validated access-token context handed to the claims builder
#[derive(Debug, Clone)]
pub struct OAuthTokenInfo {
    /// Resource owner, when the grant has one
    pub user_id: Option<Uuid>,
    /// Resource owner's email, when known
    pub email: Option<String>,
    /// Issuing client's public id
    pub client_id: String,
    /// Granted scope
    pub scope: String,
    /// Table restriction
    pub allowed_tables: Option<Vec<String>>,
    /// App the client belongs to
    pub app_id: Uuid,
    /// App rate limit, requests per window
    pub app_rate_limit_rps: Option<i64>,
    /// App rate limit window in seconds
    pub app_rate_limit_window_seconds: Option<i64>,
}

/// Authorization endpoint query parameters. Everything is optional at the
/// HTTP boundary; presence is validated in spec order.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// CSV table restriction
    pub allowed_tables: Option<String>,
}

/// Consent endpoint body: the decision plus the echoed authorize parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentRequest {
    pub decision: String,
    #[serde(flatten)]
    pub params: AuthorizeParams,
}

/// Payload returned when stored consent does not cover the request
#[derive(Debug, Serialize)]
pub struct ConsentPromptResponse {
    pub requires_consent: bool,
    pub client_id: String,
    pub client_name: String,
    pub response_type: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tables: Option<String>,
}

/// JSON alternative to the 302 redirect, for `Accept: application/json`
#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub redirect_to: String,
}

/// Token endpoint form body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
}

/// Token endpoint success body
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Revoke endpoint form body (RFC 7009). The hint is accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub token: Option<String>,
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// RFC 6749 section 5.2 error body
#[derive(Debug, Clone, Serialize)]
pub struct OAuthError {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    /// `invalid_request` (400)
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request",
            error_description: Some(description.to_owned()),
        }
    }

    /// `invalid_client` (401)
    #[must_use]
    pub fn invalid_client(description: &str) -> Self {
        Self {
            error: "invalid_client",
            error_description: Some(description.to_owned()),
        }
    }

    /// `invalid_grant` (400)
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant",
            error_description: Some(description.to_owned()),
        }
    }

    /// `invalid_scope` (400)
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope",
            error_description: Some(description.to_owned()),
        }
    }

    /// `unauthorized_client` (400)
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: "unauthorized_client",
            error_description: Some(description.to_owned()),
        }
    }

    /// `unsupported_grant_type` (400)
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type",
            error_description: Some("Grant type not supported".to_owned()),
        }
    }

    /// `server_error` (500)
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: "server_error",
            error_description: None,
        }
    }

    /// HTTP status per the error taxonomy
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self.error {
            "invalid_client" => StatusCode::UNAUTHORIZED,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        (status, Json(self)).into_response()
    }
}
