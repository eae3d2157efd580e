//! Provider client trait definition
//!
//! Defines the standard interface that both accounting provider
//! implementations satisfy, the closed set of provider variants, and the
//! typed error translation applied to upstream HTTP responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Closed set of supported accounting providers.
///
/// Adding a provider means adding a variant and one `ProviderClient`
/// implementation; the orchestrator and handlers select the variant at their
/// boundary and never dispatch on raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    QuickBooksOnline,
    ZohoBooks,
}

impl ProviderKind {
    /// Canonical name used in URLs and the providers catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::QuickBooksOnline => "quickbooks_online",
            ProviderKind::ZohoBooks => "zoho_books",
        }
    }

    /// Parse a canonical provider name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "quickbooks_online" => Some(ProviderKind::QuickBooksOnline),
            "zoho_books" => Some(ProviderKind::ZohoBooks),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::QuickBooksOnline => "QuickBooks Online",
            ProviderKind::ZohoBooks => "Zoho Books",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity kinds the sync pipeline can pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Invoice,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Invoice => "invoice",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "customer" => Some(EntityKind::Customer),
            "invoice" => Some(EntityKind::Invoice),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token set returned by a provider's token endpoint.
///
/// `refresh_token` is optional: some providers rotate it on every exchange,
/// others omit it from refresh responses. Callers persist whatever is
/// returned and keep the prior token otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Result of exchanging an authorization code: the token set plus the
/// provider's identifier for the connected account.
#[derive(Debug, Clone)]
pub struct ExchangedAccount {
    pub tokens: TokenResponse,
    /// Remote account identifier (QuickBooks realmId, Zoho organization_id)
    pub remote_id: String,
    /// Provider-specific data persisted encrypted on the integration
    pub provider_data: serde_json::Value,
    pub display_name: Option<String>,
}

/// Query parameters the OAuth callback carries beyond code/state.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// QuickBooks sends the realm id alongside the code
    pub realm_id: Option<String>,
}

/// Typed errors raised by provider HTTP calls.
#[derive(Debug, Error)]
pub enum ProviderApiError {
    /// Non-2xx response; 5xx is retryable, other statuses are not
    #[error("provider returned status {status}: {body}")]
    Http { status: u16, body: String },
    /// Token endpoint rejected the grant (revoked/expired refresh token)
    #[error("authorization rejected by provider: {0}")]
    Unauthorized(String),
    /// 429 with optional Retry-After hint
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<u64> },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderApiError {
    /// Whether the orchestrator may retry the operation.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderApiError::Timeout
            | ProviderApiError::Network(_)
            | ProviderApiError::RateLimited { .. } => true,
            ProviderApiError::Http { status, .. } => *status >= 500,
            ProviderApiError::Unauthorized(_) | ProviderApiError::MalformedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderApiError::Timeout
        } else if error.is_decode() {
            ProviderApiError::MalformedResponse(error.to_string())
        } else {
            ProviderApiError::Network(error.to_string())
        }
    }
}

/// Translate a non-success response into the typed error, consuming the body.
pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderApiError {
    let status = response.status();
    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return ProviderApiError::RateLimited { retry_after };
    }

    let body = response.text().await.unwrap_or_default();
    ProviderApiError::Http {
        status: status.as_u16(),
        body,
    }
}

/// Interface implemented once per provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The variant this client serves.
    fn kind(&self) -> ProviderKind;

    /// Build the authorization URL a user is redirected to.
    fn authorize_url(&self, state: &str) -> Result<Url, ProviderApiError>;

    /// Exchange an authorization code for tokens and the remote account id.
    async fn exchange_code(
        &self,
        code: &str,
        params: &CallbackParams,
    ) -> Result<ExchangedAccount, ProviderApiError>;

    /// Exchange a refresh token for a new token set.
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, ProviderApiError>;

    /// Fetch one page of raw entity records; records are returned unmodified,
    /// normalization is the reconciler's job.
    async fn list_entities(
        &self,
        remote_id: &str,
        entity: EntityKind,
        access_token: &str,
    ) -> Result<Vec<serde_json::Value>, ProviderApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_round_trips_canonical_names() {
        for kind in [ProviderKind::QuickBooksOnline, ProviderKind::ZohoBooks] {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("xero"), None);
    }

    #[test]
    fn entity_kind_round_trips_canonical_names() {
        for kind in [EntityKind::Customer, EntityKind::Invoice] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("bill"), None);
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderApiError::Timeout.is_transient());
        assert!(ProviderApiError::Network("reset".into()).is_transient());
        assert!(ProviderApiError::RateLimited { retry_after: None }.is_transient());
        assert!(
            ProviderApiError::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ProviderApiError::Http {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!ProviderApiError::Unauthorized("invalid_grant".into()).is_transient());
        assert!(!ProviderApiError::MalformedResponse("bad json".into()).is_transient());
    }

    #[test]
    fn token_response_tolerates_missing_refresh_token() {
        let parsed: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "expires_in": 3600
        }))
        .expect("parses");
        assert_eq!(parsed.access_token, "at");
        assert!(parsed.refresh_token.is_none());
    }
}
