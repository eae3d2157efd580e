//! # Provider Repository
//!
//! Row access for the providers catalog.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;

use crate::models::provider::{self, Entity as Provider};

/// Repository for provider catalog operations
#[derive(Clone)]
pub struct ProviderRepository {
    db: Arc<DatabaseConnection>,
}

impl ProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a provider catalog entry by name
    pub async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<provider::Model>, sea_orm::DbErr> {
        Provider::find_by_id(name.to_string()).one(&*self.db).await
    }

    /// List all catalog entries ordered by name
    pub async fn list(&self) -> Result<Vec<provider::Model>, sea_orm::DbErr> {
        Provider::find()
            .order_by_asc(provider::Column::Name)
            .all(&*self.db)
            .await
    }

    /// Insert a catalog entry
    pub async fn create(
        &self,
        active: provider::ActiveModel,
    ) -> Result<provider::Model, sea_orm::DbErr> {
        let name = active
            .name
            .clone()
            .take()
            .ok_or_else(|| sea_orm::DbErr::Custom("provider name must be set".to_string()))?;

        active.insert(&*self.db).await?;

        Provider::find_by_id(name.clone())
            .one(&*self.db)
            .await?
            .ok_or(sea_orm::DbErr::RecordNotFound(name))
    }

    /// Flip the active flag on a catalog entry
    pub async fn set_active(
        &self,
        name: &str,
        is_active: bool,
    ) -> Result<provider::Model, sea_orm::DbErr> {
        let model = Provider::find_by_id(name.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(name.to_string()))?;

        let mut active: provider::ActiveModel = model.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().into());
        active.update(&*self.db).await
    }
}
