//! Credential store for tenant integrations
//!
//! This module provides the IntegrationRepository, which owns every read and
//! write of the encrypted credential bundle and provider data on
//! tenant_integrations rows. Callers only ever see plaintext structured
//! data; ciphertext never leaves this module.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{self, CryptoError, SecretKey};
use crate::models::integration::{self, Entity as TenantIntegration};
use crate::providers::ProviderKind;

/// Plaintext credential bundle stored encrypted on an integration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds, as reported by the provider
    pub expires_in: i64,
    /// When the access token was issued
    pub token_issued_at: DateTime<Utc>,
}

impl CredentialBundle {
    /// Absolute expiry instant of the access token.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.token_issued_at + Duration::seconds(self.expires_in)
    }
}

/// Errors surfaced by credential store operations.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error(
        "remote account '{remote_id}' on provider '{provider}' is already claimed by another tenant"
    )]
    RemoteAccountAlreadyClaimed {
        provider: ProviderKind,
        remote_id: String,
    },
    #[error("integration '{0}' not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Secret(#[from] CryptoError),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Repository for tenant_integrations rows with encrypt-through semantics
#[derive(Clone)]
pub struct IntegrationRepository {
    db: Arc<DatabaseConnection>,
    secret_key: SecretKey,
}

impl IntegrationRepository {
    pub fn new(db: Arc<DatabaseConnection>, secret_key: SecretKey) -> Self {
        Self { db, secret_key }
    }

    /// Find the integration for a (tenant, provider) pair, active or not.
    pub async fn find_by_tenant_provider(
        &self,
        tenant_id: &Uuid,
        provider: ProviderKind,
    ) -> Result<Option<integration::Model>, CredentialStoreError> {
        Ok(TenantIntegration::find()
            .filter(integration::Column::TenantId.eq(*tenant_id))
            .filter(integration::Column::ProviderName.eq(provider.as_str()))
            .one(&*self.db)
            .await?)
    }

    /// Find an integration by id.
    pub async fn find_by_id(
        &self,
        id: &Uuid,
    ) -> Result<Option<integration::Model>, CredentialStoreError> {
        Ok(TenantIntegration::find_by_id(*id).one(&*self.db).await?)
    }

    /// Find the ACTIVE integration holding a remote account, regardless of
    /// tenant. Used for the exclusivity check.
    pub async fn find_active_by_remote(
        &self,
        provider: ProviderKind,
        remote_id: &str,
    ) -> Result<Option<integration::Model>, CredentialStoreError> {
        Ok(TenantIntegration::find()
            .filter(integration::Column::ProviderName.eq(provider.as_str()))
            .filter(integration::Column::RemoteId.eq(remote_id))
            .filter(integration::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?)
    }

    /// Create or update the integration for (tenant, provider, remote_id),
    /// encrypting the credential bundle and provider data in passing.
    ///
    /// A remote account actively bound to a DIFFERENT tenant is never
    /// silently reassigned; the call fails with
    /// [`CredentialStoreError::RemoteAccountAlreadyClaimed`]. The same tenant
    /// reconnecting updates in place and re-activates a soft-deactivated row.
    pub async fn upsert(
        &self,
        tenant_id: &Uuid,
        provider: ProviderKind,
        remote_id: &str,
        credentials: &CredentialBundle,
        provider_data: &serde_json::Value,
    ) -> Result<integration::Model, CredentialStoreError> {
        if let Some(existing) = self.find_active_by_remote(provider, remote_id).await? {
            if existing.tenant_id != *tenant_id {
                return Err(CredentialStoreError::RemoteAccountAlreadyClaimed {
                    provider,
                    remote_id: remote_id.to_string(),
                });
            }
        }

        let aad = crypto::integration_aad(tenant_id, provider.as_str(), remote_id);
        let credentials_ciphertext = crypto::encrypt_json(&self.secret_key, &aad, credentials)?;
        let provider_data_ciphertext = crypto::encrypt_json(&self.secret_key, &aad, provider_data)?;
        let now = Utc::now();

        let existing = TenantIntegration::find()
            .filter(integration::Column::TenantId.eq(*tenant_id))
            .filter(integration::Column::ProviderName.eq(provider.as_str()))
            .filter(integration::Column::RemoteId.eq(remote_id))
            .one(&*self.db)
            .await?;

        let id = match existing {
            Some(model) => {
                let id = model.id;
                let mut active: integration::ActiveModel = model.into();
                active.credentials_ciphertext = Set(Some(credentials_ciphertext));
                active.provider_data_ciphertext = Set(Some(provider_data_ciphertext));
                active.is_active = Set(true);
                active.updated_at = Set(now.into());
                active.update(&*self.db).await?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                let active = integration::ActiveModel {
                    id: Set(id),
                    tenant_id: Set(*tenant_id),
                    provider_name: Set(provider.as_str().to_string()),
                    remote_id: Set(remote_id.to_string()),
                    credentials_ciphertext: Set(Some(credentials_ciphertext)),
                    provider_data_ciphertext: Set(Some(provider_data_ciphertext)),
                    is_active: Set(true),
                    last_synced_at: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                active.insert(&*self.db).await?;
                id
            }
        };

        // Re-fetch by id; SQLite's insert return path is unreliable for
        // non-autoincrement keys.
        self.find_by_id(&id)
            .await?
            .ok_or(CredentialStoreError::NotFound(id))
    }

    /// Overwrite the stored credential bundle. Used by the token refresher
    /// after a successful refresh.
    pub async fn store_credentials(
        &self,
        id: &Uuid,
        credentials: &CredentialBundle,
    ) -> Result<integration::Model, CredentialStoreError> {
        let model = self
            .find_by_id(id)
            .await?
            .ok_or(CredentialStoreError::NotFound(*id))?;

        let aad =
            crypto::integration_aad(&model.tenant_id, &model.provider_name, &model.remote_id);
        let ciphertext = crypto::encrypt_json(&self.secret_key, &aad, credentials)?;

        let mut active: integration::ActiveModel = model.into();
        active.credentials_ciphertext = Set(Some(ciphertext));
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }

    /// Soft-activate or deactivate an integration. Rows are never deleted so
    /// audit history survives disconnection.
    pub async fn mark_active(
        &self,
        id: &Uuid,
        is_active: bool,
    ) -> Result<integration::Model, CredentialStoreError> {
        let model = self
            .find_by_id(id)
            .await?
            .ok_or(CredentialStoreError::NotFound(*id))?;

        let mut active: integration::ActiveModel = model.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }

    /// Record a successful sync completion time.
    pub async fn touch_last_synced(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), CredentialStoreError> {
        let model = self
            .find_by_id(id)
            .await?
            .ok_or(CredentialStoreError::NotFound(*id))?;

        let mut active: integration::ActiveModel = model.into();
        active.last_synced_at = Set(Some(at.into()));
        active.updated_at = Set(Utc::now().into());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Decrypt the credential bundle off an integration row.
    pub fn decrypt_credentials(
        &self,
        model: &integration::Model,
    ) -> Result<CredentialBundle, CredentialStoreError> {
        let ciphertext = model
            .credentials_ciphertext
            .as_deref()
            .ok_or(CryptoError::InvalidSecret)?;
        let aad =
            crypto::integration_aad(&model.tenant_id, &model.provider_name, &model.remote_id);
        Ok(crypto::decrypt_json(&self.secret_key, &aad, ciphertext)?)
    }

    /// Decrypt the provider data blob off an integration row.
    pub fn decrypt_provider_data(
        &self,
        model: &integration::Model,
    ) -> Result<serde_json::Value, CredentialStoreError> {
        let ciphertext = model
            .provider_data_ciphertext
            .as_deref()
            .ok_or(CryptoError::InvalidSecret)?;
        let aad =
            crypto::integration_aad(&model.tenant_id, &model.provider_name, &model.remote_id);
        Ok(crypto::decrypt_json(&self.secret_key, &aad, ciphertext)?)
    }
}
