//! # Sync Trigger Handlers
//!
//! The sync trigger endpoint enqueues a sync job for one
//! (provider, tenant, entity kind) triple, deduplicating against any job
//! already pending for the same integration and entity. A companion endpoint
//! exposes job status for the accepted job id.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::providers::{EntityKind, ProviderKind};
use crate::repositories::{ProviderRepository, SyncJobRepository, TenantRepository};
use crate::server::AppState;

/// Response for an accepted sync trigger
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: String,
    pub provider: String,
    pub entity_kind: String,
    /// True when an already-pending job was returned instead of a new one
    pub deduplicated: bool,
}

/// Job status response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub provider: String,
    pub entity_kind: String,
    pub status: String,
    pub attempts: i32,
    pub scheduled_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// Trigger a sync for one (provider, tenant, entity kind) triple
#[utoipa::path(
    post,
    path = "/integrations/{provider}/{tenant_id}/{entity_kind}",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider name"),
        ("tenant_id" = Uuid, Path, description = "Tenant to sync"),
        ("entity_kind" = String, Path, description = "Entity kind (customer|invoice)")
    ),
    responses(
        (status = 202, description = "Sync job accepted", body = JobAccepted),
        (status = 400, description = "Integration missing/inactive or tenant barred", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Unknown provider or entity kind", body = ApiError),
        (status = 500, description = "Unexpected failure", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path((provider_name, tenant_id, entity_kind)): Path<(String, Uuid, String)>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let provider = ProviderKind::parse(&provider_name).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' not found", provider_name),
        )
    })?;
    let entity = EntityKind::parse(&entity_kind).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("entity kind '{}' not found", entity_kind),
        )
    })?;

    let tenants = TenantRepository::new(state.db.clone());
    let tenant = tenants.find_by_id(&tenant_id).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "tenant not found",
        )
    })?;
    if !tenant.can_sync() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "tenant is barred from syncing",
        ));
    }

    let catalog = ProviderRepository::new(state.db.clone());
    let provider_active = catalog
        .find_by_name(provider.as_str())
        .await?
        .map(|p| p.is_active)
        .unwrap_or(false);
    if !provider_active {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("provider '{}' is not active", provider),
        ));
    }

    let integration = state
        .integrations
        .find_by_tenant_provider(&tenant_id, provider)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "Failed to look up integration");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "failed to look up integration",
            )
        })?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("{} is not connected for this tenant", provider.display_name()),
            )
        })?;
    if !integration.is_active {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "integration is not active",
        ));
    }

    let jobs = SyncJobRepository::new(state.db.clone());

    // A job already queued or running for this integration/entity absorbs
    // the trigger; the budget stays bound to the original job identity.
    if let Some(pending) = jobs.find_pending(&integration.id, entity).await? {
        return Ok((
            StatusCode::ACCEPTED,
            Json(JobAccepted {
                job_id: pending.id,
                status: pending.status,
                provider: provider.as_str().to_string(),
                entity_kind: entity.as_str().to_string(),
                deduplicated: true,
            }),
        ));
    }

    let job = jobs
        .enqueue(&tenant_id, provider, &integration.id, entity)
        .await?;

    tracing::info!(
        job_id = %job.id,
        tenant_id = %tenant_id,
        provider = %provider,
        entity = %entity,
        "Sync job enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: job.id,
            status: job.status,
            provider: provider.as_str().to_string(),
            entity_kind: entity.as_str().to_string(),
            deduplicated: false,
        }),
    ))
}

/// Fetch the status of a previously accepted sync job
#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    security(("bearer_auth" = [])),
    params(("job_id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job status", body = JobStatus),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn get_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatus>, ApiError> {
    let jobs = SyncJobRepository::new(state.db.clone());
    let job = jobs.find_by_id(&job_id).await?.ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "job not found")
    })?;

    Ok(Json(JobStatus {
        job_id: job.id,
        tenant_id: job.tenant_id,
        provider: job.provider_name,
        entity_kind: job.entity_kind,
        status: job.status,
        attempts: job.attempts,
        scheduled_at: job.scheduled_at.to_rfc3339(),
        finished_at: job.finished_at.map(|t| t.to_rfc3339()),
        error: job.error,
    }))
}
