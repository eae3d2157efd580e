//! # Sync Executor
//!
//! Background worker pool that claims due sync jobs and drives each one
//! through the orchestrator. Claiming is atomic and single-flight per
//! integration, so two workers can never run the same integration
//! concurrently. Retryable failures requeue the SAME job row with a fixed
//! backoff until the attempt budget is exhausted.

use chrono::Utc;
use metrics::counter;
use sea_orm::prelude::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::models::sync_job::{self, Entity as SyncJobEntity, status};
use crate::orchestrator::{SyncFailure, SyncOrchestrator, SyncState};

/// Sync executor responsible for running background sync jobs
pub struct SyncExecutor {
    db: Arc<DatabaseConnection>,
    orchestrator: Arc<SyncOrchestrator>,
    config: SyncConfig,
}

impl SyncExecutor {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orchestrator: Arc<SyncOrchestrator>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run the executor loop until the shutdown token fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_ms = self.config.tick_ms,
            concurrency = self.config.concurrency,
            "Starting sync executor"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Sync executor shutdown requested");
                break;
            }

            let start = std::time::Instant::now();

            // Claimed jobs always run to completion; shutdown is only
            // honored between ticks.
            match self.claim_and_run_jobs().await {
                Ok(count) if count > 0 => debug!("Executed {} sync jobs", count),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Error executing sync jobs"),
            }

            let elapsed = start.elapsed();
            let tick = Duration::from_millis(self.config.tick_ms);
            if elapsed < tick {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Sync executor shutdown requested");
                        break;
                    }
                    _ = sleep(tick - elapsed) => {}
                }
            }
        }

        info!("Sync executor stopped");
    }

    /// Claim due jobs and execute them under the concurrency cap.
    #[instrument(skip(self), fields(batch_size = self.config.claim_batch))]
    pub async fn claim_and_run_jobs(&self) -> Result<usize, sea_orm::DbErr> {
        let jobs = self.claim_jobs().await?;
        let count = jobs.len();

        if jobs.is_empty() {
            return Ok(0);
        }

        info!("Claimed {} jobs for execution", count);

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.concurrency));
        let mut handles = Vec::new();

        for job in jobs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let executor = self.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = executor.run_single_job(job).await {
                    error!(error = %e, "Error persisting job outcome");
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(count)
    }

    /// Atomically claim due jobs, incrementing their attempt counter.
    ///
    /// A job is due when it is queued, scheduled, past any retry backoff, and
    /// no other job for the same integration is currently running.
    async fn claim_jobs(&self) -> Result<Vec<sync_job::Model>, sea_orm::DbErr> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let eligible: Vec<Uuid> = SyncJobEntity::find()
            .select_only()
            .column(sync_job::Column::Id)
            .filter(
                sync_job::Column::Status
                    .eq(status::QUEUED)
                    .and(sync_job::Column::ScheduledAt.lte(now))
                    .and(
                        sync_job::Column::RetryAfter
                            .is_null()
                            .or(sync_job::Column::RetryAfter.lte(now)),
                    ),
            )
            .filter(
                sync_job::Column::IntegrationId.not_in_subquery(
                    SyncJobEntity::find()
                        .select_only()
                        .column(sync_job::Column::IntegrationId)
                        .filter(sync_job::Column::Status.eq(status::RUNNING))
                        .into_query(),
                ),
            )
            .order_by_asc(sync_job::Column::ScheduledAt)
            .limit(Some(self.config.claim_batch))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if eligible.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let update_result = SyncJobEntity::update_many()
            .col_expr(sync_job::Column::Status, Expr::value(status::RUNNING))
            .col_expr(sync_job::Column::StartedAt, Expr::value(now))
            .col_expr(sync_job::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                sync_job::Column::Attempts,
                Expr::value(Expr::col(sync_job::Column::Attempts).add(1)),
            )
            .filter(sync_job::Column::Id.is_in(eligible))
            .filter(sync_job::Column::Status.eq(status::QUEUED))
            .exec(&txn)
            .await?;

        let claimed = if update_result.rows_affected > 0 {
            SyncJobEntity::find()
                .filter(sync_job::Column::Status.eq(status::RUNNING))
                .filter(sync_job::Column::StartedAt.eq(now))
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed)
    }

    /// Run one claimed job and persist its outcome.
    #[instrument(skip(self), fields(job_id = %job.id, attempt = job.attempts))]
    pub async fn run_single_job(&self, job: sync_job::Model) -> Result<(), sea_orm::DbErr> {
        let outcome = match tokio::time::timeout(
            Duration::from_secs(self.config.max_run_seconds),
            self.orchestrator.run_job(&job),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    max_run_seconds = self.config.max_run_seconds,
                    "Job exceeded its run budget"
                );
                crate::orchestrator::SyncOutcome {
                    final_state: SyncState::Failed,
                    summary: None,
                    failure: Some(SyncFailure {
                        state: SyncState::Fetching,
                        kind: crate::orchestrator::FailureKind::Transient,
                        detail: format!(
                            "job timed out after {}s",
                            self.config.max_run_seconds
                        ),
                    }),
                }
            }
        };

        match outcome.failure {
            None => self.handle_success(&job).await,
            Some(failure) => self.handle_failure(&job, failure).await,
        }
    }

    async fn handle_success(&self, job: &sync_job::Model) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now();

        let mut active: sync_job::ActiveModel = job.clone().into();
        active.status = Set(status::SUCCEEDED.to_string());
        active.finished_at = Set(Some(now.into()));
        active.retry_after = Set(None);
        active.error = Set(None);
        active.updated_at = Set(now.into());
        active.update(&*self.db).await?;

        info!("Sync job succeeded (attempt {})", job.attempts);
        Ok(())
    }

    /// Requeue a retryable failure with fixed backoff, or mark the job
    /// terminally failed once the budget is spent or the failure is not
    /// retryable.
    async fn handle_failure(
        &self,
        job: &sync_job::Model,
        failure: SyncFailure,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now();
        let attempts = job.attempts.max(0);
        let budget_left = attempts < self.config.max_attempts();
        let will_retry = failure.is_retryable() && budget_left;

        // Terminal failures carry full actionable context on the job row.
        let error_details = serde_json::json!({
            "message": failure.detail,
            "kind": failure.kind_str(),
            "state": failure.state.to_string(),
            "tenant_id": job.tenant_id,
            "provider": job.provider_name,
            "entity_kind": job.entity_kind,
            "attempts": attempts,
            "timestamp": now.to_rfc3339(),
        });

        let mut active: sync_job::ActiveModel = job.clone().into();
        active.error = Set(Some(error_details));
        active.updated_at = Set(now.into());

        if will_retry {
            let backoff = chrono::Duration::seconds(self.config.retry_backoff_seconds as i64);
            active.status = Set(status::QUEUED.to_string());
            active.retry_after = Set(Some((now + backoff).into()));
            active.update(&*self.db).await?;

            counter!("sync_job_retries_total").increment(1);
            warn!(
                attempt = attempts,
                max_attempts = self.config.max_attempts(),
                backoff_seconds = self.config.retry_backoff_seconds,
                kind = failure.kind_str(),
                "Sync job requeued for retry: {}",
                failure.detail
            );
        } else {
            active.status = Set(status::FAILED.to_string());
            active.finished_at = Set(Some(now.into()));
            active.update(&*self.db).await?;

            counter!("sync_job_terminal_failures_total").increment(1);
            if failure.is_retryable() {
                warn!(
                    attempts = attempts,
                    "Sync job exhausted its retry budget: {}", failure.detail
                );
            } else {
                warn!(
                    kind = failure.kind_str(),
                    "Sync job failed terminally: {}", failure.detail
                );
            }
        }

        Ok(())
    }
}

impl Clone for SyncExecutor {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            orchestrator: self.orchestrator.clone(),
            config: self.config.clone(),
        }
    }
}
