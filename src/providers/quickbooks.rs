//! QuickBooks Online provider client
//!
//! Implements the OAuth2 web flow against Intuit's app center and the
//! `SELECT * FROM <Entity>` query dialect against the QuickBooks company
//! query endpoint. The realm id arrives as a callback query parameter and is
//! carried in the integration's provider data.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::QuickBooksSettings;
use crate::providers::trait_::{
    CallbackParams, EntityKind, ExchangedAccount, ProviderApiError, ProviderClient, ProviderKind,
    TokenResponse, error_from_response,
};

/// Page cap applied to every query, mirroring the provider's MAXRESULTS clause.
const QUERY_MAX_RESULTS: u32 = 1000;

/// Minor version pinned for invoice queries (custom fields stability).
const INVOICE_MINOR_VERSION: &str = "75";

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: Option<serde_json::Value>,
}

pub struct QuickBooksClient {
    settings: QuickBooksSettings,
    http: reqwest::Client,
}

impl QuickBooksClient {
    pub fn new(settings: QuickBooksSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { settings, http }
    }

    fn entity_table(entity: EntityKind) -> &'static str {
        match entity {
            EntityKind::Customer => "Customer",
            EntityKind::Invoice => "Invoice",
        }
    }

    async fn post_token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, ProviderApiError> {
        let response = self
            .http
            .post(&self.settings.token_url)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json::<TokenResponse>().await?)
        } else if matches!(response.status().as_u16(), 400 | 401) {
            // Intuit answers invalid_grant/invalid_client with 400/401; both
            // mean the stored grant is no longer usable.
            let body = response.text().await.unwrap_or_default();
            Err(ProviderApiError::Unauthorized(body))
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[async_trait]
impl ProviderClient for QuickBooksClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::QuickBooksOnline
    }

    fn authorize_url(&self, state: &str) -> Result<Url, ProviderApiError> {
        let mut url = Url::parse(&self.settings.authorize_url)
            .map_err(|e| ProviderApiError::MalformedResponse(format!("authorize url: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("state", state);

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        params: &CallbackParams,
    ) -> Result<ExchangedAccount, ProviderApiError> {
        let realm_id = params.realm_id.clone().ok_or_else(|| {
            ProviderApiError::MalformedResponse("callback is missing realmId".to_string())
        })?;

        let tokens = self
            .post_token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.settings.redirect_uri),
            ])
            .await?;

        debug!(realm_id = %realm_id, "Exchanged QuickBooks authorization code");

        Ok(ExchangedAccount {
            tokens,
            remote_id: realm_id.clone(),
            provider_data: serde_json::json!({ "realm_id": realm_id }),
            display_name: None,
        })
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, ProviderApiError> {
        self.post_token_request(&[
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
        let table = Self::entity_table(entity);
        let query = format!("SELECT * FROM {} MAXRESULTS {}", table, QUERY_MAX_RESULTS);

        let url = format!(
            "{}/v3/company/{}/query",
            self.settings.api_base(),
            remote_id
        );

        let mut request = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(&[("query", query.as_str())]);

        if entity == EntityKind::Invoice {
            request = request.query(&[("minorversion", INVOICE_MINOR_VERSION)]);
        }

        let response = request.send().await?;

        if response.status().as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderApiError::Unauthorized(body));
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let envelope: QueryEnvelope = response.json().await?;
        let records = envelope
            .query_response
            .and_then(|qr| qr.get(table).cloned())
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default();

        if records.is_empty() {
            warn!(realm_id = %remote_id, entity = %entity, "QuickBooks query returned no records");
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(api_base: Option<&str>) -> QuickBooksSettings {
        QuickBooksSettings {
            client_id: "qbo-client".to_string(),
            client_secret: "qbo-secret".to_string(),
            redirect_uri: "https://example.com/callback/quickbooks_online".to_string(),
            environment: "sandbox".to_string(),
            authorize_url: "https://appcenter.intuit.com/connect/oauth2".to_string(),
            token_url: "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer".to_string(),
            api_base_url: api_base.map(str::to_string),
            scopes: "com.intuit.quickbooks.accounting".to_string(),
            http_timeout_secs: 10,
        }
    }

    #[test]
    fn authorize_url_contains_oauth_parameters() {
        let client = QuickBooksClient::new(test_settings(None));
        let url = client.authorize_url("state-token-123").expect("url");

        assert!(
            url.as_str()
                .starts_with("https://appcenter.intuit.com/connect/oauth2")
        );
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("client_id".into(), "qbo-client".into())));
        assert!(query.contains(&("response_type".into(), "code".into())));
        assert!(query.contains(&("state".into(), "state-token-123".into())));
        assert!(query.contains(&("scope".into(), "com.intuit.quickbooks.accounting".into())));
    }

    #[tokio::test]
    async fn exchange_code_requires_realm_id() {
        let client = QuickBooksClient::new(test_settings(None));
        let result = client
            .exchange_code("auth-code", &CallbackParams::default())
            .await;

        assert!(matches!(
            result,
            Err(ProviderApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn entity_tables_match_query_dialect() {
        assert_eq!(QuickBooksClient::entity_table(EntityKind::Customer), "Customer");
        assert_eq!(QuickBooksClient::entity_table(EntityKind::Invoice), "Invoice");
    }
}
