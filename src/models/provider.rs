//! Provider entity model
//!
//! This module contains the SeaORM entity model for the providers table,
//! which serves as a global catalog of supported accounting providers.
//! OAuth client settings are not stored here; they are typed configuration
//! values passed into the provider clients at startup.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Provider entity representing external accounting service providers
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    /// Unique name identifier for the provider (primary key),
    /// e.g. "quickbooks_online", "zoho_books"
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    /// Display name of the provider
    pub display_name: String,

    /// Auth mechanism (oauth2|api_key|bearer|basic)
    pub auth_type: String,

    /// Whether the provider is available for new connections and syncs
    pub is_active: bool,

    /// Timestamp when the provider was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the provider was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
