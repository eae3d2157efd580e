//! Tenant entity model
//!
//! This module contains the SeaORM entity model for the tenants table,
//! which stores tenant information for multi-tenancy.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Tenant status values recognized by the sync policy gate.
pub const TENANT_STATUS_ACTIVE: &str = "active";

/// Tenant entity representing an isolated customer organization
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name for the tenant (optional)
    pub name: Option<String>,

    /// Tenant lifecycle status (active|suspended)
    pub status: String,

    /// Whether the tenant may use the service at all
    pub is_active: bool,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the tenant was last updated
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// A tenant may sync only while active and not suspended.
    pub fn can_sync(&self) -> bool {
        self.is_active && self.status == TENANT_STATUS_ACTIVE
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
