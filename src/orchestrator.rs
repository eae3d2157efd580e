//! # Sync Orchestrator
//!
//! Drives one sync job through the state machine
//! `Pending → Validating → Refreshing → Fetching → Reconciling → Completed`.
//! Every step returns a typed result; the failure kind decides whether the
//! executor retries (`Transient`) or terminates the job (`Policy`,
//! `Reauthorize`, `Permanent`). There is no catch-all retry path.

use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::models::{provider as provider_model, sync_job, tenant};
use crate::providers::{EntityKind, ProviderApiError, ProviderKind, ProviderRegistry};
use crate::reconcile::{self, ReconcileError, ReconcileSummary};
use crate::repositories::{CredentialStoreError, IntegrationRepository};
use crate::token_refresh::{RefreshError, TokenRefresher};

/// States a sync job moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Validating,
    Refreshing,
    Fetching,
    Reconciling,
    Completed,
    Retrying,
    Failed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncState::Pending => "pending",
            SyncState::Validating => "validating",
            SyncState::Refreshing => "refreshing",
            SyncState::Fetching => "fetching",
            SyncState::Reconciling => "reconciling",
            SyncState::Completed => "completed",
            SyncState::Retrying => "retrying",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Classification deciding what the executor does with a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Policy rejection (inactive tenant/integration, unknown provider);
    /// terminal, never retried
    Policy,
    /// The stored grant is unusable; a human must re-authorize; terminal
    Reauthorize,
    /// Permanent provider-side failure (4xx, malformed payload); terminal
    Permanent,
    /// Worth retrying within the budget
    Transient,
}

/// A step failure carrying the state it happened in.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{state} step failed: {detail}")]
pub struct SyncFailure {
    pub state: SyncState,
    pub kind: FailureKind,
    pub detail: String,
}

impl SyncFailure {
    fn policy(state: SyncState, detail: impl Into<String>) -> Self {
        Self {
            state,
            kind: FailureKind::Policy,
            detail: detail.into(),
        }
    }

    fn reauthorize(state: SyncState, detail: impl Into<String>) -> Self {
        Self {
            state,
            kind: FailureKind::Reauthorize,
            detail: detail.into(),
        }
    }

    fn permanent(state: SyncState, detail: impl Into<String>) -> Self {
        Self {
            state,
            kind: FailureKind::Permanent,
            detail: detail.into(),
        }
    }

    fn transient(state: SyncState, detail: impl Into<String>) -> Self {
        Self {
            state,
            kind: FailureKind::Transient,
            detail: detail.into(),
        }
    }

    /// Only transient failures consume the retry budget; everything else
    /// terminates the job at once.
    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Transient
    }

    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            FailureKind::Policy => "policy",
            FailureKind::Reauthorize => "reauthorize",
            FailureKind::Permanent => "permanent",
            FailureKind::Transient => "transient",
        }
    }
}

/// Result of running a job once through the state machine.
#[derive(Debug)]
pub struct SyncOutcome {
    pub final_state: SyncState,
    pub summary: Option<ReconcileSummary>,
    pub failure: Option<SyncFailure>,
}

/// Orchestrates single sync job executions
pub struct SyncOrchestrator {
    db: Arc<DatabaseConnection>,
    store: Arc<IntegrationRepository>,
    refresher: Arc<TokenRefresher>,
    registry: Arc<ProviderRegistry>,
}

impl SyncOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        store: Arc<IntegrationRepository>,
        refresher: Arc<TokenRefresher>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            db,
            store,
            refresher,
            registry,
        }
    }

    /// Run one attempt of a job. The caller (executor) owns persistence of
    /// the job row and the retry decision.
    #[instrument(skip_all, fields(
        job_id = %job.id,
        tenant_id = %job.tenant_id,
        provider = %job.provider_name,
        entity = %job.entity_kind,
        attempt = job.attempts
    ))]
    pub async fn run_job(&self, job: &sync_job::Model) -> SyncOutcome {
        let started = std::time::Instant::now();
        let result = self.execute(job).await;
        histogram!("sync_job_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(summary) => {
                counter!("sync_job_completed_total").increment(1);
                SyncOutcome {
                    final_state: SyncState::Completed,
                    summary: Some(summary),
                    failure: None,
                }
            }
            Err(failure) => {
                warn!(
                    state = %failure.state,
                    kind = failure.kind_str(),
                    detail = %failure.detail,
                    "Sync job attempt failed"
                );
                counter!("sync_job_failed_attempts_total").increment(1);
                SyncOutcome {
                    final_state: SyncState::Failed,
                    summary: None,
                    failure: Some(failure),
                }
            }
        }
    }

    async fn execute(&self, job: &sync_job::Model) -> Result<ReconcileSummary, SyncFailure> {
        let mut state = SyncState::Pending;

        // Validating
        advance(&mut state, SyncState::Validating);

        let provider = ProviderKind::parse(&job.provider_name).ok_or_else(|| {
            SyncFailure::policy(state, format!("unknown provider '{}'", job.provider_name))
        })?;
        let entity = EntityKind::parse(&job.entity_kind).ok_or_else(|| {
            SyncFailure::policy(state, format!("unknown entity kind '{}'", job.entity_kind))
        })?;

        let tenant_row = tenant::Entity::find_by_id(job.tenant_id)
            .one(&*self.db)
            .await
            .map_err(|e| SyncFailure::transient(state, e.to_string()))?
            .ok_or_else(|| SyncFailure::policy(state, "tenant not found"))?;
        if !tenant_row.can_sync() {
            return Err(SyncFailure::policy(
                state,
                format!("tenant '{}' is barred from syncing", tenant_row.id),
            ));
        }

        let catalog_row = provider_model::Entity::find_by_id(provider.as_str().to_string())
            .one(&*self.db)
            .await
            .map_err(|e| SyncFailure::transient(state, e.to_string()))?;
        if !catalog_row.map(|p| p.is_active).unwrap_or(false) {
            return Err(SyncFailure::policy(
                state,
                format!("provider '{}' is not active in the catalog", provider),
            ));
        }

        // Active-at-validate is authoritative for the rest of the job; a
        // concurrent deactivation does not abort an in-flight run.
        let integration = self
            .store
            .find_by_id(&job.integration_id)
            .await
            .map_err(|e| store_failure(state, e))?
            .ok_or_else(|| SyncFailure::policy(state, "integration not found"))?;
        if !integration.is_active {
            return Err(SyncFailure::policy(state, "integration is inactive"));
        }

        // Refreshing
        advance(&mut state, SyncState::Refreshing);

        let access_token = self
            .refresher
            .valid_access_token(&integration)
            .await
            .map_err(|e| refresh_failure(state, e))?;

        // Fetching
        advance(&mut state, SyncState::Fetching);

        let client = self
            .registry
            .get(provider)
            .map_err(|e| SyncFailure::policy(state, e.to_string()))?;

        let records = client
            .list_entities(&integration.remote_id, entity, &access_token)
            .await
            .map_err(|e| provider_failure(state, e))?;

        info!(records = records.len(), "Fetched remote records");

        // Reconciling
        advance(&mut state, SyncState::Reconciling);

        let summary = reconcile::reconcile(&self.db, &integration, entity, &records)
            .await
            .map_err(|e| match e {
                // A rolled-back transaction is redone wholesale on retry;
                // idempotent upserts make that safe.
                ReconcileError::Db(db_err) => SyncFailure::transient(state, db_err.to_string()),
                ReconcileError::UnknownProvider(name) => {
                    SyncFailure::policy(state, format!("unknown provider '{}'", name))
                }
            })?;

        // Completed
        advance(&mut state, SyncState::Completed);

        self.store
            .touch_last_synced(&integration.id, chrono::Utc::now())
            .await
            .map_err(|e| store_failure(state, e))?;

        Ok(summary)
    }
}

fn advance(state: &mut SyncState, next: SyncState) {
    info!(from = %state, to = %next, "Sync state transition");
    *state = next;
}

fn store_failure(state: SyncState, error: CredentialStoreError) -> SyncFailure {
    match error {
        // Corrupted ciphertext means the stored grant is unusable; only a
        // fresh authorization can repair it.
        CredentialStoreError::Secret(e) => SyncFailure::reauthorize(state, e.to_string()),
        CredentialStoreError::NotFound(id) => {
            SyncFailure::policy(state, format!("integration '{}' not found", id))
        }
        other => SyncFailure::transient(state, other.to_string()),
    }
}

fn refresh_failure(state: SyncState, error: RefreshError) -> SyncFailure {
    match error {
        RefreshError::TokenRefreshFailed { detail, .. } => SyncFailure::reauthorize(state, detail),
        RefreshError::Transient(detail) => SyncFailure::transient(state, detail),
        RefreshError::UnknownProvider(name) => {
            SyncFailure::policy(state, format!("unknown provider '{}'", name))
        }
        RefreshError::Registry(e) => SyncFailure::policy(state, e.to_string()),
        RefreshError::Store(e) => store_failure(state, e),
    }
}

fn provider_failure(state: SyncState, error: ProviderApiError) -> SyncFailure {
    if error.is_transient() {
        return SyncFailure::transient(state, error.to_string());
    }
    match error {
        ProviderApiError::Unauthorized(detail) => SyncFailure::reauthorize(state, detail),
        other => SyncFailure::permanent(state, other.to_string()),
    }
}
