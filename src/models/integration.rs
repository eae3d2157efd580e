//! TenantIntegration entity model
//!
//! This module contains the SeaORM entity model for the tenant_integrations
//! table, which stores the credential/state record for one (tenant, provider)
//! pair. Credential and provider-data bundles are stored as AES-GCM
//! ciphertext; the remote account identifier is kept in the clear so the
//! exclusivity invariant stays queryable.

use super::provider::Entity as Provider;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// TenantIntegration entity representing a tenant's connection to a provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_integrations")]
pub struct Model {
    /// Unique identifier for the integration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Name of the provider this integration belongs to
    pub provider_name: String,

    /// Provider's own identifier for the connected account
    /// (QuickBooks realmId, Zoho Books organization_id)
    pub remote_id: String,

    /// Encrypted credential bundle (access/refresh token, expiry)
    pub credentials_ciphertext: Option<Vec<u8>>,

    /// Encrypted provider-specific data (e.g. {"realm_id": ...})
    pub provider_data_ciphertext: Option<Vec<u8>>,

    /// Whether the integration is active; deactivation is soft, rows are
    /// never hard-deleted
    pub is_active: bool,

    /// When the last successful sync completed
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the integration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the integration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Provider",
        from = "Column::ProviderName",
        to = "super::provider::Column::Name"
    )]
    Provider,
}

impl Related<Provider> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
