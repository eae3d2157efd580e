//! FieldMapping entity model
//!
//! Declarative correspondence between a local entity field and a provider API
//! field, scoped per (tenant, provider, entity kind). Mappings document the
//! expected payload shape; the reconciler flags required mappings missing
//! from a payload but does not depend on them to function.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "field_mappings")]
pub struct Model {
    /// Unique identifier for the mapping (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub provider_name: String,

    /// Entity kind the mapping applies to (customer|invoice)
    pub entity_kind: String,

    /// Local schema field name
    pub local_field: String,

    /// Provider payload field path (dot notation, e.g. "CustomerRef.value")
    pub provider_field: String,

    /// Whether the provider field is expected on every payload
    pub is_required: bool,

    pub description: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
