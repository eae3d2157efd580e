//! # Data Models
//!
//! This module contains all the data models used throughout the Ledgersync API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod customer;
pub mod field_mapping;
pub mod integration;
pub mod invoice;
pub mod oauth_state;
pub mod provider;
pub mod sync_job;
pub mod tenant;

pub use customer::Entity as Customer;
pub use field_mapping::Entity as FieldMapping;
pub use integration::Entity as TenantIntegration;
pub use invoice::Entity as Invoice;
pub use oauth_state::Entity as OAuthState;
pub use provider::Entity as Provider;
pub use sync_job::Entity as SyncJob;
pub use tenant::Entity as Tenant;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "ledgersync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
