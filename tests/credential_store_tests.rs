//! Credential store integration tests: encrypt-through persistence,
//! remote-account exclusivity, and soft deactivation.

mod test_utils;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use ledgersync::models::integration;
use ledgersync::providers::ProviderKind;
use ledgersync::repositories::CredentialStoreError;

use test_utils::{fresh_bundle, integration_repo, seed_integration, seed_tenant, setup_db};

#[tokio::test]
async fn upsert_round_trips_credentials_and_provider_data() {
    let db = setup_db().await;
    let repo = integration_repo(&db);
    let tenant = seed_tenant(&db, "acme").await;

    let bundle = fresh_bundle();
    let model = seed_integration(&repo, &tenant.id, "9341", &bundle).await;

    assert!(model.is_active);
    assert!(model.last_synced_at.is_none());
    // Plaintext never hits the row
    let ciphertext = model.credentials_ciphertext.as_deref().expect("ciphertext");
    assert!(!ciphertext
        .windows(bundle.access_token.len())
        .any(|w| w == bundle.access_token.as_bytes()));

    let decrypted = repo.decrypt_credentials(&model).expect("decrypts");
    assert_eq!(decrypted, bundle);

    let provider_data = repo.decrypt_provider_data(&model).expect("decrypts");
    assert_eq!(provider_data["realm_id"], "9341");
}

#[tokio::test]
async fn remote_account_cannot_be_claimed_by_second_tenant() {
    let db = setup_db().await;
    let repo = integration_repo(&db);
    let tenant_a = seed_tenant(&db, "tenant-a").await;
    let tenant_b = seed_tenant(&db, "tenant-b").await;

    let first = seed_integration(&repo, &tenant_a.id, "9341", &fresh_bundle()).await;

    // Tenant B attempting to bind the same realm must be rejected
    let result = repo
        .upsert(
            &tenant_b.id,
            ProviderKind::QuickBooksOnline,
            "9341",
            &fresh_bundle(),
            &serde_json::json!({ "realm_id": "9341" }),
        )
        .await;
    assert!(matches!(
        result,
        Err(CredentialStoreError::RemoteAccountAlreadyClaimed { .. })
    ));

    // Tenant A reconnecting updates in place rather than duplicating
    let mut rotated = fresh_bundle();
    rotated.access_token = "rotated-access-token".to_string();
    let second = repo
        .upsert(
            &tenant_a.id,
            ProviderKind::QuickBooksOnline,
            "9341",
            &rotated,
            &serde_json::json!({ "realm_id": "9341" }),
        )
        .await
        .expect("same tenant re-upsert succeeds");

    assert_eq!(second.id, first.id);
    let decrypted = repo.decrypt_credentials(&second).expect("decrypts");
    assert_eq!(decrypted.access_token, "rotated-access-token");

    let all = integration::Entity::find().all(&*db.conn).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn deactivated_claim_releases_the_remote_account() {
    let db = setup_db().await;
    let repo = integration_repo(&db);
    let tenant_a = seed_tenant(&db, "tenant-a").await;
    let tenant_b = seed_tenant(&db, "tenant-b").await;

    let first = seed_integration(&repo, &tenant_a.id, "9341", &fresh_bundle()).await;
    repo.mark_active(&first.id, false).await.expect("deactivate");

    // Only ACTIVE claims are exclusive; a disconnected account may be
    // re-bound elsewhere.
    let second = repo
        .upsert(
            &tenant_b.id,
            ProviderKind::QuickBooksOnline,
            "9341",
            &fresh_bundle(),
            &serde_json::json!({ "realm_id": "9341" }),
        )
        .await
        .expect("claim after release succeeds");

    assert_eq!(second.tenant_id, tenant_b.id);

    // The deactivated row survives for audit history
    let all = integration::Entity::find().all(&*db.conn).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn tampered_ciphertext_fails_decryption() {
    let db = setup_db().await;
    let repo = integration_repo(&db);
    let tenant = seed_tenant(&db, "acme").await;

    let model = seed_integration(&repo, &tenant.id, "9341", &fresh_bundle()).await;

    let mut corrupted = model.credentials_ciphertext.clone().expect("ciphertext");
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;

    let mut active: integration::ActiveModel = model.into();
    active.credentials_ciphertext = Set(Some(corrupted));
    let tampered = active.update(&*db.conn).await.expect("store tampered blob");

    let result = repo.decrypt_credentials(&tampered);
    assert!(matches!(result, Err(CredentialStoreError::Secret(_))));
}

#[tokio::test]
async fn ciphertext_is_bound_to_its_row() {
    let db = setup_db().await;
    let repo = integration_repo(&db);
    let tenant_a = seed_tenant(&db, "tenant-a").await;
    let tenant_b = seed_tenant(&db, "tenant-b").await;

    let source = seed_integration(&repo, &tenant_a.id, "1111", &fresh_bundle()).await;
    let target = seed_integration(&repo, &tenant_b.id, "2222", &fresh_bundle()).await;

    // Moving tenant A's ciphertext onto tenant B's row must fail closed
    let mut active: integration::ActiveModel = target.into();
    active.credentials_ciphertext = Set(source.credentials_ciphertext.clone());
    let grafted = active.update(&*db.conn).await.expect("store grafted blob");

    let result = repo.decrypt_credentials(&grafted);
    assert!(matches!(result, Err(CredentialStoreError::Secret(_))));
}

#[tokio::test]
async fn touch_last_synced_records_completion_time() {
    let db = setup_db().await;
    let repo = integration_repo(&db);
    let tenant = seed_tenant(&db, "acme").await;

    let model = seed_integration(&repo, &tenant.id, "9341", &fresh_bundle()).await;
    let now = Utc::now();
    repo.touch_last_synced(&model.id, now).await.expect("touch");

    let reloaded = repo
        .find_by_id(&model.id)
        .await
        .expect("query")
        .expect("row exists");
    let recorded = reloaded.last_synced_at.expect("timestamp set");
    assert!((recorded.with_timezone(&chrono::Utc) - now).num_seconds().abs() < 2);
}
