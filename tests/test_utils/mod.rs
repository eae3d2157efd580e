//! Shared test fixtures: migrated throwaway databases, deterministic crypto
//! keys, seeded tenants/integrations, and provider settings pointed at a
//! wiremock server.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{Database, DatabaseConnection};
use tempfile::TempDir;
use uuid::Uuid;

use ledgersync::config::{QuickBooksSettings, SyncConfig};
use ledgersync::crypto::SecretKey;
use ledgersync::migration::{Migrator, MigratorTrait};
use ledgersync::models::{integration, tenant};
use ledgersync::providers::{ProviderKind, ProviderRegistry, QuickBooksClient};
use ledgersync::repositories::{CredentialBundle, IntegrationRepository, TenantRepository};

/// A migrated SQLite database living in its own temp directory. Keep the
/// `TempDir` alive for the duration of the test.
pub struct TestDb {
    pub conn: Arc<DatabaseConnection>,
    _dir: TempDir,
}

pub async fn setup_db() -> TestDb {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("test.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let conn = Database::connect(&url).await.expect("connect test db");
    Migrator::up(&conn, None).await.expect("apply migrations");
    ledgersync::seeds::seed_providers(&conn)
        .await
        .expect("seed providers");

    TestDb {
        conn: Arc::new(conn),
        _dir: dir,
    }
}

pub fn test_secret_key() -> SecretKey {
    SecretKey::new(vec![7u8; 32]).expect("valid test key")
}

pub fn integration_repo(db: &TestDb) -> Arc<IntegrationRepository> {
    Arc::new(IntegrationRepository::new(db.conn.clone(), test_secret_key()))
}

pub async fn seed_tenant(db: &TestDb, name: &str) -> tenant::Model {
    TenantRepository::new(db.conn.clone())
        .create(name)
        .await
        .expect("create tenant")
}

/// Credential bundle with plenty of lifetime left; syncs skip the refresh.
pub fn fresh_bundle() -> CredentialBundle {
    CredentialBundle {
        access_token: "fresh-access-token".to_string(),
        refresh_token: "stored-refresh-token".to_string(),
        expires_in: 3600,
        token_issued_at: Utc::now(),
    }
}

/// Credential bundle inside the five-minute safety margin; forces a refresh.
pub fn expiring_bundle() -> CredentialBundle {
    CredentialBundle {
        access_token: "stale-access-token".to_string(),
        refresh_token: "stored-refresh-token".to_string(),
        expires_in: 3600,
        token_issued_at: Utc::now() - Duration::seconds(3500),
    }
}

pub async fn seed_integration(
    repo: &IntegrationRepository,
    tenant_id: &Uuid,
    remote_id: &str,
    bundle: &CredentialBundle,
) -> integration::Model {
    repo.upsert(
        tenant_id,
        ProviderKind::QuickBooksOnline,
        remote_id,
        bundle,
        &serde_json::json!({ "realm_id": remote_id }),
    )
    .await
    .expect("seed integration")
}

/// QuickBooks settings with both the token endpoint and the query API
/// pointed at a mock server.
pub fn qbo_settings(mock_base: &str) -> QuickBooksSettings {
    QuickBooksSettings {
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
        redirect_uri: format!("{}/callback/quickbooks_online", mock_base),
        environment: "sandbox".to_string(),
        authorize_url: "https://appcenter.intuit.com/connect/oauth2".to_string(),
        token_url: format!("{}/oauth2/v1/tokens/bearer", mock_base),
        api_base_url: Some(mock_base.to_string()),
        scopes: "com.intuit.quickbooks.accounting".to_string(),
        http_timeout_secs: 10,
    }
}

pub fn registry_with_qbo(mock_base: &str) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(QuickBooksClient::new(qbo_settings(mock_base))));
    Arc::new(registry)
}

/// Executor config tuned for tests: immediate ticks, one-second backoff.
pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        tick_ms: 100,
        concurrency: 4,
        claim_batch: 10,
        max_run_seconds: 30,
        max_retries: 3,
        retry_backoff_seconds: 1,
    }
}
