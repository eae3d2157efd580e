//! # OAuth Callback Handler
//!
//! Completes the OAuth flow: validates and consumes the stored state,
//! exchanges the authorization code at the provider's token endpoint, and
//! persists the integration through the credential store. A remote account
//! already claimed by another tenant is rejected, never reassigned.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, provider_error};
use crate::providers::{CallbackParams, ProviderApiError, ProviderKind};
use crate::repositories::{
    CredentialBundle, CredentialStoreError, FieldMappingRepository, OAuthStateRepository,
    TenantRepository,
};
use crate::server::AppState;

/// Query parameters the provider redirects back with
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
    /// QuickBooks appends the company realm id
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
}

/// Successful connection response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackResponse {
    pub detail: String,
    pub integration_id: Uuid,
    pub provider: String,
    pub remote_id: String,
}

/// Handle the provider's OAuth redirect
#[utoipa::path(
    get,
    path = "/callback/{provider}",
    params(
        ("provider" = String, Path, description = "Provider name"),
        ("code" = String, Query, description = "Authorization code"),
        ("state" = String, Query, description = "CSRF state token"),
        ("realmId" = Option<String>, Query, description = "QuickBooks realm id")
    ),
    responses(
        (status = 200, description = "Provider connected", body = CallbackResponse),
        (status = 400, description = "Connecting tenant is no longer active", body = ApiError),
        (status = 401, description = "Invalid or expired state token", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError),
        (status = 409, description = "Remote account already claimed by another tenant", body = ApiError),
        (status = 502, description = "Provider token endpoint failure", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let provider = ProviderKind::parse(&provider_name).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' not found", provider_name),
        )
    })?;

    // Consume the state so it can never be replayed; absence or expiry are
    // indistinguishable to the caller.
    let oauth_states = OAuthStateRepository::new(state.db.clone());
    let oauth_state = oauth_states
        .find_and_consume(provider, &query.state)
        .await?
        .ok_or_else(|| {
            tracing::warn!(provider = %provider, "OAuth callback with invalid or expired state");
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "invalid or expired state parameter",
            )
        })?;

    let tenants = TenantRepository::new(state.db.clone());
    let tenant = tenants
        .find_by_id(&oauth_state.tenant_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "tenant not found")
        })?;
    if !tenant.can_sync() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "tenant is no longer active",
        ));
    }

    let client = state.registry.get(provider).map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' is not configured", provider),
        )
    })?;

    let callback_params = CallbackParams {
        realm_id: query.realm_id.clone(),
    };
    let account = client
        .exchange_code(&query.code, &callback_params)
        .await
        .map_err(|err| exchange_error(provider, err))?;

    if account.tokens.refresh_token.is_none() {
        tracing::warn!(
            provider = %provider,
            "Token exchange returned no refresh token; integration will require re-authorization at expiry"
        );
    }

    let credentials = CredentialBundle {
        access_token: account.tokens.access_token.clone(),
        refresh_token: account.tokens.refresh_token.clone().unwrap_or_default(),
        expires_in: account.tokens.expires_in,
        token_issued_at: Utc::now(),
    };

    let integration = state
        .integrations
        .upsert(
            &tenant.id,
            provider,
            &account.remote_id,
            &credentials,
            &account.provider_data,
        )
        .await
        .map_err(|err| match err {
            CredentialStoreError::RemoteAccountAlreadyClaimed { .. } => ApiError::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                "this account is already connected to another tenant",
            ),
            other => {
                tracing::error!(error = %other, "Failed to persist integration");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "failed to persist integration",
                )
            }
        })?;

    // Install the default mapping set so payload-shape validation has a
    // baseline to check against.
    if provider == ProviderKind::QuickBooksOnline {
        let mappings = FieldMappingRepository::new(state.db.clone());
        if let Err(err) = mappings.install_qbo_invoice_defaults(&tenant.id).await {
            tracing::warn!(error = %err, "Failed to install default field mappings");
        }
    }

    tracing::info!(
        tenant_id = %tenant.id,
        provider = %provider,
        remote_id = %account.remote_id,
        integration_id = %integration.id,
        "Provider connected"
    );

    Ok(Json(CallbackResponse {
        detail: format!("{} connected successfully", provider.display_name()),
        integration_id: integration.id,
        provider: provider.as_str().to_string(),
        remote_id: account.remote_id,
    }))
}

fn exchange_error(provider: ProviderKind, err: ProviderApiError) -> ApiError {
    match err {
        ProviderApiError::Http { status, body } => {
            provider_error(provider.as_str().to_string(), status, Some(body))
        }
        ProviderApiError::Unauthorized(detail) => {
            provider_error(provider.as_str().to_string(), 401, Some(detail))
        }
        other => {
            tracing::error!(provider = %provider, error = %other, "Token exchange failed");
            provider_error(provider.as_str().to_string(), 502, Some(other.to_string()))
        }
    }
}
