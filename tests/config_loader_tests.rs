//! Config loader integration tests using layered `.env` files in a
//! throwaway directory.

use std::fs;

use base64::{Engine as _, engine::general_purpose};
use ledgersync::config::ConfigLoader;
use tempfile::TempDir;

fn secret_key_b64() -> String {
    general_purpose::STANDARD.encode(vec![7u8; 32])
}

fn write_env(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).expect("write env file");
}

#[test]
fn loads_layered_env_files() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "LEDGERSYNC_PROFILE=test\n\
             LEDGERSYNC_OPERATOR_TOKENS=tok-one, tok-two\n\
             LEDGERSYNC_SECRET_KEY={}\n\
             LEDGERSYNC_DATABASE_URL=sqlite::memory:\n",
            secret_key_b64()
        ),
    );
    write_env(&dir, ".env.test", "LEDGERSYNC_LOG_LEVEL=debug\n");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(config.profile, "test");
    assert_eq!(config.operator_tokens, vec!["tok-one", "tok-two"]);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.secret_key.as_ref().map(|k| k.len()), Some(32));
}

#[test]
fn provider_settings_require_both_credentials() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "LEDGERSYNC_OPERATOR_TOKEN=tok\n\
             LEDGERSYNC_SECRET_KEY={}\n\
             LEDGERSYNC_QBO_CLIENT_ID=only-the-id\n",
            secret_key_b64()
        ),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    // Half-configured providers are treated as absent
    assert!(config.quickbooks.is_none());
}

#[test]
fn quickbooks_settings_parse_with_overrides() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        &format!(
            "LEDGERSYNC_OPERATOR_TOKEN=tok\n\
             LEDGERSYNC_SECRET_KEY={}\n\
             LEDGERSYNC_QBO_CLIENT_ID=qbo-id\n\
             LEDGERSYNC_QBO_CLIENT_SECRET=qbo-secret\n\
             LEDGERSYNC_QBO_ENVIRONMENT=production\n\
             LEDGERSYNC_SYNC_MAX_RETRIES=5\n\
             LEDGERSYNC_SYNC_RETRY_BACKOFF_SECONDS=10\n",
            secret_key_b64()
        ),
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    let qbo = config.quickbooks.expect("quickbooks configured");
    assert_eq!(qbo.environment, "production");
    assert_eq!(qbo.api_base(), "https://quickbooks.api.intuit.com");
    assert_eq!(config.sync.max_retries, 5);
    assert_eq!(config.sync.max_attempts(), 6);
    assert_eq!(config.sync.retry_backoff_seconds, 10);
}

#[test]
fn invalid_secret_key_fails_fast() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LEDGERSYNC_OPERATOR_TOKEN=tok\nLEDGERSYNC_SECRET_KEY=not-base64!!!\n",
    );

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(result.is_err());
}

#[test]
fn short_secret_key_fails_fast() {
    let dir = TempDir::new().unwrap();
    let short_key = general_purpose::STANDARD.encode(vec![7u8; 16]);
    write_env(
        &dir,
        ".env",
        &format!("LEDGERSYNC_OPERATOR_TOKEN=tok\nLEDGERSYNC_SECRET_KEY={}\n", short_key),
    );

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(result.is_err());
}
