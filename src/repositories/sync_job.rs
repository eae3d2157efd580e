//! # Sync Job Repository
//!
//! Enqueue and lookup helpers for sync_jobs rows. Claiming and state
//! transitions during execution live in the executor, which needs
//! transactional control; this repository covers the handler-facing paths.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::sync_job::{self, Entity as SyncJob, status};
use crate::providers::{EntityKind, ProviderKind};

/// Repository for sync job database operations
#[derive(Clone)]
pub struct SyncJobRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncJobRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a job by id
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<sync_job::Model>, sea_orm::DbErr> {
        SyncJob::find_by_id(*id).one(&*self.db).await
    }

    /// An unfinished (queued or running) job for the same integration and
    /// entity kind, if one exists. The trigger endpoint returns this instead
    /// of stacking duplicates.
    pub async fn find_pending(
        &self,
        integration_id: &Uuid,
        entity: EntityKind,
    ) -> Result<Option<sync_job::Model>, sea_orm::DbErr> {
        SyncJob::find()
            .filter(sync_job::Column::IntegrationId.eq(*integration_id))
            .filter(sync_job::Column::EntityKind.eq(entity.as_str()))
            .filter(
                sync_job::Column::Status
                    .eq(status::QUEUED)
                    .or(sync_job::Column::Status.eq(status::RUNNING)),
            )
            .one(&*self.db)
            .await
    }

    /// Enqueue a new job, scheduled to run immediately.
    pub async fn enqueue(
        &self,
        tenant_id: &Uuid,
        provider: ProviderKind,
        integration_id: &Uuid,
        entity: EntityKind,
    ) -> Result<sync_job::Model, sea_orm::DbErr> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let active = sync_job::ActiveModel {
            id: Set(id),
            tenant_id: Set(*tenant_id),
            provider_name: Set(provider.as_str().to_string()),
            integration_id: Set(*integration_id),
            entity_kind: Set(entity.as_str().to_string()),
            status: Set(status::QUEUED.to_string()),
            attempts: Set(0),
            scheduled_at: Set(now.into()),
            retry_after: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        active.insert(&*self.db).await?;

        SyncJob::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("sync job {}", id)))
    }
}
