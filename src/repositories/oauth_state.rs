//! # OAuth State Repository
//!
//! Database operations for OAuth CSRF state management. States are created
//! with an explicit expiry and consumed (deleted) on first use so a state
//! token can never be replayed.

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, Entity as OAuthState, Model};
use crate::providers::ProviderKind;

/// Repository for OAuth state database operations
#[derive(Clone)]
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new OAuth state record with the given expiry window.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        provider: ProviderKind,
        state: &str,
        expires_in_minutes: i64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let active = oauth_state::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            provider_name: Set(provider.as_str().to_string()),
            state: Set(state.to_string()),
            expires_at: Set((now + Duration::minutes(expires_in_minutes)).into()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        OAuthState::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("oauth state {}", id)))
    }

    /// Find an unexpired state by provider and token value.
    pub async fn find_by_provider_state(
        &self,
        provider: ProviderKind,
        state: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        OAuthState::find()
            .filter(oauth_state::Column::ProviderName.eq(provider.as_str()))
            .filter(oauth_state::Column::State.eq(state))
            .filter(oauth_state::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await
    }

    /// Find and consume a state (delete it after retrieval to prevent reuse).
    pub async fn find_and_consume(
        &self,
        provider: ProviderKind,
        state: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        let found = self.find_by_provider_state(provider, state).await?;

        if let Some(ref model) = found {
            OAuthState::delete_by_id(model.id).exec(&*self.db).await?;
        }

        Ok(found)
    }

    /// Delete a specific state by id (cleanup after a failed flow start).
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let result = OAuthState::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Clean up expired states.
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = OAuthState::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
