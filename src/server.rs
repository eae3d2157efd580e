//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! Ledgersync API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth;
use crate::config::AppConfig;
use crate::handlers;
use crate::providers::ProviderRegistry;
use crate::repositories::IntegrationRepository;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub registry: Arc<ProviderRegistry>,
    pub integrations: Arc<IntegrationRepository>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // The callback is reached by the provider's redirect and cannot carry an
    // operator token; everything else operator-facing is behind auth.
    let protected = Router::new()
        .route(
            "/connect/{provider}/{tenant_id}",
            post(handlers::connect::start_oauth),
        )
        .route(
            "/integrations/{provider}/{tenant_id}/{entity_kind}",
            post(handlers::sync::trigger_sync),
        )
        .route("/jobs/{job_id}", get(handlers::sync::get_job))
        .layer(middleware::from_fn_with_state(
            config,
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/callback/{provider}",
            get(handlers::callback::oauth_callback),
        )
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server with the given configuration, shutting down when the
/// provided token fires.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::connect::start_oauth,
        crate::handlers::callback::oauth_callback,
        crate::handlers::sync::trigger_sync,
        crate::handlers::sync::get_job,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::connect::AuthorizeUrlResponse,
            crate::handlers::callback::CallbackResponse,
            crate::handlers::sync::JobAccepted,
            crate::handlers::sync::JobStatus,
        )
    ),
    info(
        title = "Ledgersync API",
        description = "Multi-tenant accounting provider synchronization service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
