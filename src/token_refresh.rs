//! # Token Refresh
//!
//! On-demand access-token refresh for sync operations. The refresher is the
//! single place token races are prevented: refreshing is serialized per
//! integration through an in-process async lock, and the credential row is
//! re-read under that lock so a concurrent sync that already refreshed is
//! observed instead of double-refreshing (which would invalidate the
//! newly-rotated refresh token).

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::integration;
use crate::providers::{ProviderKind, ProviderRegistry, RegistryError};
use crate::repositories::{CredentialBundle, CredentialStoreError, IntegrationRepository};

/// Access tokens within this margin of expiry are refreshed preemptively, so
/// a token never expires mid-request.
pub const REFRESH_SAFETY_MARGIN_SECONDS: i64 = 300;

/// Errors surfaced by token refresh operations.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The provider rejected the refresh grant; the integration requires
    /// re-authorization by a human and the failure must not be retried.
    #[error("token refresh failed for integration {integration_id}: {detail}")]
    TokenRefreshFailed {
        integration_id: Uuid,
        provider: ProviderKind,
        detail: String,
    },
    /// Network-level trouble reaching the token endpoint; retryable.
    #[error("transient token refresh failure: {0}")]
    Transient(String),
    #[error("integration row references unknown provider '{0}'")]
    UnknownProvider(String),
    #[error(transparent)]
    Store(#[from] CredentialStoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Whether a credential bundle is due for refresh at `now`.
///
/// Refresh triggers exactly when the remaining lifetime is within the safety
/// margin; a token with more than five minutes left is served from storage
/// with no network call.
pub fn needs_refresh(bundle: &CredentialBundle, now: DateTime<Utc>) -> bool {
    bundle.expires_at() <= now + Duration::seconds(REFRESH_SAFETY_MARGIN_SECONDS)
}

/// On-demand token refresher with per-integration serialization
pub struct TokenRefresher {
    store: Arc<IntegrationRepository>,
    registry: Arc<ProviderRegistry>,
    /// One async mutex per integration id; guards the check-then-refresh
    /// sequence
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TokenRefresher {
    pub fn new(store: Arc<IntegrationRepository>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            store,
            registry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, integration_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(integration_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return a currently-valid access token for the integration, refreshing
    /// it through the provider's token endpoint when the stored one is inside
    /// the safety margin.
    #[instrument(skip_all, fields(integration_id = %integration.id, provider = %integration.provider_name))]
    pub async fn valid_access_token(
        &self,
        integration: &integration::Model,
    ) -> Result<String, RefreshError> {
        let lock = self.lock_for(integration.id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent job may have refreshed while
        // we waited, and its rotated refresh token is the only valid one.
        let current = self
            .store
            .find_by_id(&integration.id)
            .await?
            .ok_or(CredentialStoreError::NotFound(integration.id))?;

        let bundle = self.store.decrypt_credentials(&current)?;
        let now = Utc::now();

        if !needs_refresh(&bundle, now) {
            debug!("Cached access token still valid, skipping refresh");
            return Ok(bundle.access_token);
        }

        let kind = ProviderKind::parse(&current.provider_name)
            .ok_or_else(|| RefreshError::UnknownProvider(current.provider_name.clone()))?;
        let client = self.registry.get(kind)?;

        counter!("token_refresh_attempts_total").increment(1);

        match client.refresh_access_token(&bundle.refresh_token).await {
            Ok(tokens) => {
                // Persist whatever refresh token the provider returned:
                // rotated when present, otherwise the stored one stays valid.
                let new_bundle = CredentialBundle {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token.unwrap_or(bundle.refresh_token),
                    expires_in: tokens.expires_in,
                    token_issued_at: now,
                };

                self.store
                    .store_credentials(&current.id, &new_bundle)
                    .await?;

                info!(
                    expires_in = new_bundle.expires_in,
                    "Refreshed access token"
                );
                counter!("token_refresh_success_total").increment(1);

                Ok(new_bundle.access_token)
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient failure reaching token endpoint");
                counter!("token_refresh_transient_failure_total").increment(1);
                Err(RefreshError::Transient(e.to_string()))
            }
            Err(e) => {
                warn!(error = %e, "Refresh grant rejected, integration requires re-authorization");
                counter!("token_refresh_permanent_failure_total").increment(1);
                Err(RefreshError::TokenRefreshFailed {
                    integration_id: current.id,
                    provider: kind,
                    detail: e.to_string(),
                })
            }
        }
    }
}
