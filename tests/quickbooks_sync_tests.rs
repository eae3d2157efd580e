//! End-to-end tests over the HTTP surface: OAuth connect/callback against a
//! mocked QuickBooks, the sync trigger endpoint, and the idempotent
//! two-customer scenario.

mod test_utils;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ledgersync::config::AppConfig;
use ledgersync::models::customer;
use ledgersync::orchestrator::SyncOrchestrator;
use ledgersync::providers::ProviderKind;
use ledgersync::server::{AppState, create_app};
use ledgersync::sync_executor::SyncExecutor;
use ledgersync::token_refresh::TokenRefresher;

use test_utils::{
    TestDb, fast_sync_config, fresh_bundle, integration_repo, registry_with_qbo,
    seed_integration, seed_tenant, setup_db,
};

const OPERATOR_TOKEN: &str = "test-operator-token";

fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        secret_key: Some(vec![7u8; 32]),
        ..Default::default()
    })
}

fn build_app(db: &TestDb, mock_base: &str) -> (Router, SyncExecutor) {
    let registry = registry_with_qbo(mock_base);
    let integrations = integration_repo(db);

    let refresher = Arc::new(TokenRefresher::new(integrations.clone(), registry.clone()));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        db.conn.clone(),
        integrations.clone(),
        refresher,
        registry.clone(),
    ));
    let executor = SyncExecutor::new(db.conn.clone(), orchestrator, fast_sync_config());

    let state = AppState {
        config: test_config(),
        db: db.conn.clone(),
        registry,
        integrations,
    };

    (create_app(state), executor)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn authed_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", OPERATOR_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", OPERATOR_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn mount_customer_query(realm: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/v3/company/{}/query", realm)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "QueryResponse": {
                "Customer": [
                    {"Id": "1", "DisplayName": "Acme"},
                    {"Id": "2", "DisplayName": "Globex"}
                ],
                "maxResults": 2
            }
        })))
}

#[tokio::test]
async fn two_customer_scenario_is_idempotent_end_to_end() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let repo = integration_repo(&db);
    let tenant = seed_tenant(&db, "tenant-t").await;
    seed_integration(&repo, &tenant.id, "9341", &fresh_bundle()).await;

    mount_customer_query("9341").mount(&mock).await;

    let (app, executor) = build_app(&db, &mock.uri());

    // First sync: accepted, then executed
    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/integrations/quickbooks_online/{}/customer",
            tenant.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = json_body(response).await;
    let job_id: Uuid = accepted["job_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(accepted["deduplicated"], false);

    executor.claim_and_run_jobs().await.unwrap();

    let rows = customer::Entity::find()
        .filter(customer::Column::TenantId.eq(tenant.id))
        .all(&*db.conn)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let mut remote_ids: Vec<_> = rows.iter().map(|r| r.remote_id.clone()).collect();
    remote_ids.sort();
    assert_eq!(remote_ids, vec!["1", "2"]);
    for row in &rows {
        assert_eq!(row.provider_name, "quickbooks_online");
        assert_eq!(row.tenant_id, tenant.id);
    }
    let first_run_ids: Vec<_> = rows.iter().map(|r| r.id).collect();

    // Job status is queryable
    let response = app
        .clone()
        .oneshot(authed_get(&format!("/jobs/{}", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = json_body(response).await;
    assert_eq!(status["status"], "succeeded");
    assert_eq!(status["attempts"], 1);

    // Second sync with the same remote snapshot: zero new rows
    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/integrations/quickbooks_online/{}/customer",
            tenant.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    executor.claim_and_run_jobs().await.unwrap();

    let rows = customer::Entity::find()
        .filter(customer::Column::TenantId.eq(tenant.id))
        .all(&*db.conn)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let mut second_run_ids: Vec<_> = rows.iter().map(|r| r.id).collect();
    second_run_ids.sort();
    let mut expected = first_run_ids.clone();
    expected.sort();
    assert_eq!(second_run_ids, expected);
}

#[tokio::test]
async fn oauth_connect_and_callback_create_the_integration() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let tenant = seed_tenant(&db, "tenant-t").await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v1/tokens/bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "exchanged-access-token",
            "refresh_token": "exchanged-refresh-token",
            "expires_in": 3600,
            "x_refresh_token_expires_in": 8726400,
            "token_type": "bearer"
        })))
        .mount(&mock)
        .await;

    let (app, _executor) = build_app(&db, &mock.uri());

    // Start the flow; the returned URL carries our state token
    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/connect/quickbooks_online/{}",
            tenant.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let authorize_url = Url::parse(body["authorize_url"].as_str().unwrap()).unwrap();
    assert_eq!(authorize_url.scheme(), "https");
    let state = authorize_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter present");

    // Provider redirects back with code, state, and realm
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/callback/quickbooks_online?code=auth-code&state={}&realmId=9341",
                    state
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["remote_id"], "9341");

    // Credentials landed encrypted and decrypt back to the exchanged tokens
    let repo = integration_repo(&db);
    let integration = repo
        .find_by_tenant_provider(&tenant.id, ProviderKind::QuickBooksOnline)
        .await
        .unwrap()
        .expect("integration created");
    assert_eq!(integration.remote_id, "9341");
    assert!(integration.is_active);

    let bundle = repo.decrypt_credentials(&integration).expect("decrypts");
    assert_eq!(bundle.access_token, "exchanged-access-token");
    assert_eq!(bundle.refresh_token, "exchanged-refresh-token");
}

#[tokio::test]
async fn callback_with_invalid_state_is_unauthorized() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let (app, _executor) = build_app(&db, &mock.uri());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/callback/quickbooks_online?code=auth-code&state=forged&realmId=9341")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn callback_rejects_realm_claimed_by_another_tenant() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let repo = integration_repo(&db);
    let tenant_a = seed_tenant(&db, "tenant-a").await;
    let tenant_b = seed_tenant(&db, "tenant-b").await;

    // Tenant A already owns realm 9341
    seed_integration(&repo, &tenant_a.id, "9341", &fresh_bundle()).await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v1/tokens/bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "exchanged-access-token",
            "refresh_token": "exchanged-refresh-token",
            "expires_in": 3600
        })))
        .mount(&mock)
        .await;

    let (app, _executor) = build_app(&db, &mock.uri());

    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/connect/quickbooks_online/{}",
            tenant_b.id
        )))
        .await
        .unwrap();
    let body = json_body(response).await;
    let authorize_url = Url::parse(body["authorize_url"].as_str().unwrap()).unwrap();
    let state = authorize_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/callback/quickbooks_online?code=auth-code&state={}&realmId=9341",
                    state
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn trigger_endpoint_enforces_auth_and_validation() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let tenant = seed_tenant(&db, "tenant-t").await;
    let (app, _executor) = build_app(&db, &mock.uri());

    // No bearer token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/integrations/quickbooks_online/{}/customer",
                    tenant.id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown provider
    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/integrations/xero/{}/customer",
            tenant.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Unknown entity kind
    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/integrations/quickbooks_online/{}/bill",
            tenant.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Provider known but not connected for the tenant
    let response = app
        .clone()
        .oneshot(authed_post(&format!(
            "/integrations/quickbooks_online/{}/customer",
            tenant.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trigger_deduplicates_against_a_pending_job() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let repo = integration_repo(&db);
    let tenant = seed_tenant(&db, "tenant-t").await;
    seed_integration(&repo, &tenant.id, "9341", &fresh_bundle()).await;

    let (app, _executor) = build_app(&db, &mock.uri());
    let uri = format!("/integrations/quickbooks_online/{}/customer", tenant.id);

    let first = json_body(app.clone().oneshot(authed_post(&uri)).await.unwrap()).await;
    let second = json_body(app.clone().oneshot(authed_post(&uri)).await.unwrap()).await;

    assert_eq!(first["deduplicated"], false);
    assert_eq!(second["deduplicated"], true);
    assert_eq!(first["job_id"], second["job_id"]);
}

#[tokio::test]
async fn inactive_integration_is_rejected_at_the_trigger() {
    let db = setup_db().await;
    let mock = MockServer::start().await;
    let repo = integration_repo(&db);
    let tenant = seed_tenant(&db, "tenant-t").await;
    let integration = seed_integration(&repo, &tenant.id, "9341", &fresh_bundle()).await;
    repo.mark_active(&integration.id, false).await.unwrap();

    let (app, _executor) = build_app(&db, &mock.uri());

    let response = app
        .oneshot(authed_post(&format!(
            "/integrations/quickbooks_online/{}/customer",
            tenant.id
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
