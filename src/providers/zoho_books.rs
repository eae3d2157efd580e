//! Zoho Books provider client
//!
//! Implements the OAuth2 flow against the Zoho accounts server and entity
//! queries against the Zoho Books REST API. Zoho does not return the
//! organization id in the OAuth callback, so it is discovered right after the
//! code exchange via the organizations endpoint. Refresh responses carry no
//! refresh token; the stored one keeps being reused.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ZohoBooksSettings;
use crate::providers::trait_::{
    CallbackParams, EntityKind, ExchangedAccount, ProviderApiError, ProviderClient, ProviderKind,
    TokenResponse, error_from_response,
};

#[derive(Debug, Deserialize)]
struct OrganizationsEnvelope {
    #[serde(default)]
    organizations: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    organization_id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct ZohoBooksClient {
    settings: ZohoBooksSettings,
    http: reqwest::Client,
}

impl ZohoBooksClient {
    pub fn new(settings: ZohoBooksSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { settings, http }
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth/v2/token", self.settings.accounts_base)
    }

    fn entity_path(entity: EntityKind) -> &'static str {
        match entity {
            EntityKind::Customer => "contacts",
            EntityKind::Invoice => "invoices",
        }
    }

    async fn post_token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, ProviderApiError> {
        let response = self
            .http
            .post(self.token_endpoint())
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            if matches!(response.status().as_u16(), 400 | 401) {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderApiError::Unauthorized(body));
            }
            return Err(error_from_response(response).await);
        }

        // Zoho reports grant failures inside a 200 body as {"error": "..."}
        let body: serde_json::Value = response.json().await?;
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(ProviderApiError::Unauthorized(error.to_string()));
        }

        serde_json::from_value(body)
            .map_err(|e| ProviderApiError::MalformedResponse(format!("token response: {e}")))
    }

    /// Look up the connected organization after a code exchange.
    async fn primary_organization(
        &self,
        access_token: &str,
    ) -> Result<Organization, ProviderApiError> {
        let response = self
            .http
            .get(format!("{}/organizations", self.settings.api_base_url))
            .header(
                "Authorization",
                format!("Zoho-oauthtoken {}", access_token),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let envelope: OrganizationsEnvelope = response.json().await?;
        envelope.organizations.into_iter().next().ok_or_else(|| {
            ProviderApiError::MalformedResponse(
                "token grants access to no Zoho Books organization".to_string(),
            )
        })
    }
}

#[async_trait]
impl ProviderClient for ZohoBooksClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ZohoBooks
    }

    fn authorize_url(&self, state: &str) -> Result<Url, ProviderApiError> {
        let mut url = Url::parse(&format!("{}/oauth/v2/auth", self.settings.accounts_base))
            .map_err(|e| ProviderApiError::MalformedResponse(format!("authorize url: {e}")))?;

        url.query_pairs_mut()
            .append_pair("scope", &self.settings.scope)
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("state", state);

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _params: &CallbackParams,
    ) -> Result<ExchangedAccount, ProviderApiError> {
        let tokens = self
            .post_token_request(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
            ])
            .await?;

        let organization = self.primary_organization(&tokens.access_token).await?;
        debug!(organization_id = %organization.organization_id, "Resolved Zoho Books organization");

        Ok(ExchangedAccount {
            remote_id: organization.organization_id.clone(),
            provider_data: serde_json::json!({
                "organization_id": organization.organization_id,
            }),
            display_name: organization.name,
            tokens,
        })
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, ProviderApiError> {
        self.post_token_request(&[
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn list_entities(
        &self,
        remote_id: &str,
        entity: EntityKind,
        access_token: &str,
    ) -> Result<Vec<serde_json::Value>, ProviderApiError> {
        let path = Self::entity_path(entity);
        let response = self
            .http
            .get(format!("{}/{}", self.settings.api_base_url, path))
            .header(
                "Authorization",
                format!("Zoho-oauthtoken {}", access_token),
            )
            .query(&[("organization_id", remote_id)])
            .send()
            .await?;

        if response.status().as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderApiError::Unauthorized(body));
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: serde_json::Value = response.json().await?;
        let records = body
            .get(path)
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default();

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> ZohoBooksSettings {
        ZohoBooksSettings {
            client_id: "zoho-client".to_string(),
            client_secret: "zoho-secret".to_string(),
            redirect_uri: "https://example.com/callback/zoho_books".to_string(),
            accounts_base: "https://accounts.zoho.com".to_string(),
            api_base_url: "https://books.zoho.com/api/v3".to_string(),
            scope: "ZohoBooks.fullaccess.all".to_string(),
            http_timeout_secs: 10,
        }
    }

    #[test]
    fn authorize_url_is_region_aware_and_offline() {
        let client = ZohoBooksClient::new(test_settings());
        let url = client.authorize_url("zoho-state").expect("url");

        assert!(
            url.as_str()
                .starts_with("https://accounts.zoho.com/oauth/v2/auth")
        );
        assert!(url.as_str().contains("access_type=offline"));
        assert!(url.as_str().contains("ZohoBooks.fullaccess.all"));
        assert!(url.as_str().contains("state=zoho-state"));
    }

    #[test]
    fn entity_paths_match_books_api() {
        assert_eq!(ZohoBooksClient::entity_path(EntityKind::Customer), "contacts");
        assert_eq!(ZohoBooksClient::entity_path(EntityKind::Invoice), "invoices");
    }

    #[test]
    fn token_endpoint_derives_from_accounts_base() {
        let client = ZohoBooksClient::new(ZohoBooksSettings {
            accounts_base: "https://accounts.zoho.eu".to_string(),
            ..test_settings()
        });
        assert_eq!(
            client.token_endpoint(),
            "https://accounts.zoho.eu/oauth/v2/token"
        );
    }
}
