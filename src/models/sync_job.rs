//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table.
//! A row is the identity of one sync trigger; retries update the same row,
//! which is what bounds the retry budget per originating trigger.

use super::integration::Entity as TenantIntegration;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Job status values used by the executor state transitions.
pub mod status {
    pub const QUEUED: &str = "queued";
    pub const RUNNING: &str = "running";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
}

/// SyncJob entity representing one unit of orchestrated sync work
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Name of the provider this job is for
    pub provider_name: String,

    /// Integration this job is associated with
    pub integration_id: Uuid,

    /// Entity kind being synced (customer|invoice)
    pub entity_kind: String,

    /// Current status of the job (queued, running, succeeded, failed)
    pub status: String,

    /// Number of attempts made for this job
    pub attempts: i32,

    /// Timestamp when the job is scheduled to run
    pub scheduled_at: DateTimeWithTimeZone,

    /// Timestamp when the job becomes eligible for retry after backoff
    pub retry_after: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job started execution
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job finished execution
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Structured error details if the job failed
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    /// Timestamp when the sync job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the sync job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "TenantIntegration",
        from = "Column::IntegrationId",
        to = "super::integration::Column::Id"
    )]
    Integration,
}

impl Related<TenantIntegration> for Entity {
    fn to() -> RelationDef {
        Relation::Integration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
