//! # Ledgersync API Main Entry Point
//!
//! Loads configuration, runs migrations, seeds the provider catalog, and
//! starts the HTTP server alongside the background sync executor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ledgersync::config::ConfigLoader;
use ledgersync::crypto::SecretKey;
use ledgersync::migration::{Migrator, MigratorTrait};
use ledgersync::orchestrator::SyncOrchestrator;
use ledgersync::providers::ProviderRegistry;
use ledgersync::repositories::IntegrationRepository;
use ledgersync::server::{AppState, run_server};
use ledgersync::sync_executor::SyncExecutor;
use ledgersync::token_refresh::TokenRefresher;
use ledgersync::{db, seeds, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!("Configuration: {}", redacted_json);
    }

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;
    seeds::seed_providers(&db).await?;

    let config = Arc::new(config);
    let db = Arc::new(db);

    // Config validation guarantees the key is present and 32 bytes.
    let secret_key = SecretKey::new(
        config
            .secret_key
            .clone()
            .expect("validated configuration carries a secret key"),
    )?;

    let registry = Arc::new(ProviderRegistry::from_config(&config));
    let integrations = Arc::new(IntegrationRepository::new(db.clone(), secret_key));
    let refresher = Arc::new(TokenRefresher::new(integrations.clone(), registry.clone()));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        db.clone(),
        integrations.clone(),
        refresher,
        registry.clone(),
    ));

    let shutdown = CancellationToken::new();

    let executor = SyncExecutor::new(db.clone(), orchestrator, config.sync.clone());
    let executor_shutdown = shutdown.clone();
    let executor_handle = tokio::spawn(async move {
        executor.run(executor_shutdown).await;
    });

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl_c_shutdown.cancel();
        }
    });

    let state = AppState {
        config,
        db,
        registry,
        integrations,
    };

    let server_result = run_server(state, shutdown.clone()).await;

    shutdown.cancel();
    let _ = executor_handle.await;

    server_result
}
