//! # Tenant Repository
//!
//! Row access for tenants. Tenant administration is out of scope; the sync
//! pipeline only reads tenants to enforce the policy gate, and tests create
//! them directly.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::tenant::{self, Entity as Tenant};

/// Repository for tenant database operations
#[derive(Clone)]
pub struct TenantRepository {
    db: Arc<DatabaseConnection>,
}

impl TenantRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a tenant by id
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<tenant::Model>, sea_orm::DbErr> {
        Tenant::find_by_id(*id).one(&*self.db).await
    }

    /// Create a tenant with the given name, active by default
    pub async fn create(&self, name: &str) -> Result<tenant::Model, sea_orm::DbErr> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let active = tenant::ActiveModel {
            id: Set(id),
            name: Set(Some(name.to_string())),
            status: Set(tenant::TENANT_STATUS_ACTIVE.to_string()),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        Tenant::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("tenant {}", id)))
    }

    /// Update a tenant's status and active flag
    pub async fn set_status(
        &self,
        id: &Uuid,
        status: &str,
        is_active: bool,
    ) -> Result<tenant::Model, sea_orm::DbErr> {
        let model = Tenant::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("tenant {}", id)))?;

        let mut active: tenant::ActiveModel = model.into();
        active.status = Set(status.to_string());
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().into());
        active.update(&*self.db).await
    }
}
