//! Customer entity model
//!
//! Reconciled customer records pulled from a provider, uniquely identified by
//! (tenant, provider, remote entity id). The untouched provider payload is
//! kept in `raw` for forward compatibility and debugging.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Unique identifier for the customer row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Name of the provider this record was pulled from
    pub provider_name: String,

    /// Provider's entity id (QuickBooks `Id`, Zoho `contact_id`)
    pub remote_id: String,

    /// Customer display name
    pub display_name: String,

    /// Legal/company name when distinct from the display name
    pub company_name: Option<String>,

    pub email: Option<String>,
    pub phone: Option<String>,

    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,

    /// Original provider payload
    #[sea_orm(column_type = "JsonBinary")]
    pub raw: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
