//! Provider registry
//!
//! Maps each [`ProviderKind`] variant to its client implementation. The
//! registry is built once at startup from the typed provider settings and
//! shared by reference; there is no ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::providers::quickbooks::QuickBooksClient;
use crate::providers::trait_::{ProviderClient, ProviderKind};
use crate::providers::zoho_books::ZohoBooksClient;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("provider '{kind}' is not configured")]
    ProviderNotConfigured { kind: ProviderKind },
}

/// Provider registry holding one client per configured provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Build the registry from application configuration. Providers without
    /// credentials are skipped with a warning and stay unavailable.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        match &config.quickbooks {
            Some(settings) => {
                registry.register(Arc::new(QuickBooksClient::new(settings.clone())));
            }
            None => warn!("QuickBooks client not registered: missing client credentials"),
        }

        match &config.zoho_books {
            Some(settings) => {
                registry.register(Arc::new(ZohoBooksClient::new(settings.clone())));
            }
            None => warn!("Zoho Books client not registered: missing client credentials"),
        }

        registry
    }

    /// Register a provider client under its own kind
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.kind(), client);
    }

    /// Get the client for a provider variant
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderClient>, RegistryError> {
        self.clients
            .get(&kind)
            .cloned()
            .ok_or(RegistryError::ProviderNotConfigured { kind })
    }

    /// Provider variants with a configured client, sorted by name for stable
    /// ordering
    pub fn configured(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.clients.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::trait_::{
        CallbackParams, EntityKind, ExchangedAccount, ProviderApiError, TokenResponse,
    };
    use async_trait::async_trait;
    use url::Url;

    struct StubClient(ProviderKind);

    #[async_trait]
    impl ProviderClient for StubClient {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        fn authorize_url(&self, _state: &str) -> Result<Url, ProviderApiError> {
            Ok(Url::parse("https://example.com/oauth/authorize").unwrap())
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _params: &CallbackParams,
        ) -> Result<ExchangedAccount, ProviderApiError> {
            Err(ProviderApiError::Network("stub".into()))
        }

        async fn refresh_access_token(
            &self,
            _refresh_token: &str,
        ) -> Result<TokenResponse, ProviderApiError> {
            Err(ProviderApiError::Network("stub".into()))
        }

        async fn list_entities(
            &self,
            _remote_id: &str,
            _entity: EntityKind,
            _access_token: &str,
        ) -> Result<Vec<serde_json::Value>, ProviderApiError> {
            Ok(vec![])
        }
    }

    #[test]
    fn unconfigured_provider_is_an_error() {
        let registry = ProviderRegistry::new();
        let result = registry.get(ProviderKind::QuickBooksOnline);
        assert!(matches!(
            result,
            Err(RegistryError::ProviderNotConfigured {
                kind: ProviderKind::QuickBooksOnline
            })
        ));
    }

    #[test]
    fn registered_provider_resolves() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubClient(ProviderKind::ZohoBooks)));

        assert!(registry.get(ProviderKind::ZohoBooks).is_ok());
        assert_eq!(registry.configured(), vec![ProviderKind::ZohoBooks]);
    }

    #[test]
    fn from_config_skips_unconfigured_providers() {
        let config = AppConfig::default();
        let registry = ProviderRegistry::from_config(&config);
        assert!(registry.configured().is_empty());
    }

    #[test]
    fn configured_order_is_stable() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubClient(ProviderKind::ZohoBooks)));
        registry.register(Arc::new(StubClient(ProviderKind::QuickBooksOnline)));

        assert_eq!(
            registry.configured(),
            vec![ProviderKind::QuickBooksOnline, ProviderKind::ZohoBooks]
        );
    }
}
