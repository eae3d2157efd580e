//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access
//! with tenant-aware methods. The integration repository doubles as the
//! credential store: all ciphertext handling is confined to it.

pub mod field_mapping;
pub mod integration;
pub mod oauth_state;
pub mod provider;
pub mod sync_job;
pub mod tenant;

pub use field_mapping::FieldMappingRepository;
pub use integration::{CredentialBundle, CredentialStoreError, IntegrationRepository};
pub use oauth_state::OAuthStateRepository;
pub use provider::ProviderRepository;
pub use sync_job::SyncJobRepository;
pub use tenant::TenantRepository;
