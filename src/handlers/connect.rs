//! # Connect Handlers
//!
//! Starts the OAuth authorization flow for a provider: generates a CSRF
//! state token, persists it server-side with an explicit expiry, and returns
//! the provider's authorization URL for user redirection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::providers::ProviderKind;
use crate::repositories::{OAuthStateRepository, ProviderRepository, TenantRepository};
use crate::server::AppState;

/// OAuth state lifetime; a user has this long to complete the provider's
/// consent screen.
const OAUTH_STATE_TTL_MINUTES: i64 = 15;

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    /// Complete authorization URL for user redirection
    /// Must be HTTPS, valid per RFC 3986, max 2048 chars, no fragment
    pub authorize_url: String,
}

/// Start OAuth flow for a provider on behalf of a tenant
#[utoipa::path(
    post,
    path = "/connect/{provider}/{tenant_id}",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider name (e.g. 'quickbooks_online')"),
        ("tenant_id" = Uuid, Path, description = "Tenant starting the connection")
    ),
    responses(
        (status = 200, description = "OAuth authorization URL generated successfully", body = AuthorizeUrlResponse),
        (status = 400, description = "Tenant is not allowed to connect providers", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Provider not found or not configured", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn start_oauth(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path((provider_name, tenant_id)): Path<(String, Uuid)>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let provider = ProviderKind::parse(&provider_name).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' not found", provider_name),
        )
    })?;

    let catalog = ProviderRepository::new(state.db.clone());
    let active_in_catalog = catalog
        .find_by_name(provider.as_str())
        .await?
        .map(|p| p.is_active)
        .unwrap_or(false);
    if !active_in_catalog {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' is not available", provider),
        ));
    }

    let tenants = TenantRepository::new(state.db.clone());
    let tenant = tenants.find_by_id(&tenant_id).await?.ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "tenant not found")
    })?;
    if !tenant.can_sync() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "tenant is not active; contact your administrator",
        ));
    }

    let client = state.registry.get(provider).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' is not configured", provider),
        )
    })?;

    let state_token = generate_secure_state();

    let oauth_states = OAuthStateRepository::new(state.db.clone());
    let oauth_state = oauth_states
        .create(tenant_id, provider, &state_token, OAUTH_STATE_TTL_MINUTES)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "Failed to persist OAuth state");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to create OAuth state",
            )
        })?;

    let authorize_url = match client.authorize_url(&state_token) {
        Ok(url) => url,
        Err(err) => {
            tracing::error!(provider = %provider, error = %err, "Failed to generate authorize URL");

            // Clean up the created state since the flow failed
            let _ = oauth_states.delete_by_id(oauth_state.id).await;

            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to generate authorization URL",
            ));
        }
    };

    validate_authorize_url(&authorize_url)?;

    tracing::info!(
        tenant_id = %tenant_id,
        provider = %provider,
        state_id = %oauth_state.id,
        "OAuth flow initiated"
    );

    Ok(Json(AuthorizeUrlResponse {
        authorize_url: authorize_url.to_string(),
    }))
}

/// Generate a cryptographically secure random state token
pub(crate) fn generate_secure_state() -> String {
    use rand::Rng;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);

    base64_url::encode(&bytes)
}

/// Validate authorization URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Provider bug: generated authorization URL must use HTTPS",
        ));
    }

    // No fragment component per OAuth 2.0 RFC 6749 section 3.1
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Provider bug: generated authorization URL must not include fragment component",
        ));
    }

    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Provider bug: generated authorization URL exceeds maximum length of 2048 characters",
        ));
    }

    Ok(())
}
