//! Provider catalog seeding
//!
//! Seeds the providers table with the supported accounting providers at
//! startup. Existing entries are left untouched so an operator's active-flag
//! changes survive restarts.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use std::sync::Arc;

use crate::models::provider;
use crate::providers::ProviderKind;
use crate::repositories::ProviderRepository;

/// Seeds the providers table with the supported accounting providers.
pub async fn seed_providers(db: &DatabaseConnection) -> Result<()> {
    let repo = ProviderRepository::new(Arc::new(db.clone()));

    for kind in [ProviderKind::QuickBooksOnline, ProviderKind::ZohoBooks] {
        match repo.find_by_name(kind.as_str()).await {
            Ok(Some(_)) => {
                tracing::debug!(provider = %kind, "Provider already seeded, skipping");
                continue;
            }
            Ok(None) => {
                tracing::info!(provider = %kind, "Seeding provider catalog entry");

                let now = Utc::now();
                let active = provider::ActiveModel {
                    name: Set(kind.as_str().to_string()),
                    display_name: Set(kind.display_name().to_string()),
                    auth_type: Set("oauth2".to_string()),
                    is_active: Set(true),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };

                repo.create(active).await?;
            }
            Err(e) => {
                tracing::error!(provider = %kind, error = %e, "Failed to check provider seed");
                return Err(e.into());
            }
        }
    }

    tracing::info!("Provider seeding completed");
    Ok(())
}
