//! Database migrations for the Ledgersync API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_05_01_000001_create_tenants;
mod m2025_05_01_000100_create_providers;
mod m2025_05_01_000200_create_tenant_integrations;
mod m2025_05_02_110000_create_oauth_states;
mod m2025_05_10_093000_create_customers;
mod m2025_05_10_093100_create_invoices;
mod m2025_05_12_140000_create_field_mappings;
mod m2025_05_20_081500_create_sync_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_01_000001_create_tenants::Migration),
            Box::new(m2025_05_01_000100_create_providers::Migration),
            Box::new(m2025_05_01_000200_create_tenant_integrations::Migration),
            Box::new(m2025_05_02_110000_create_oauth_states::Migration),
            Box::new(m2025_05_10_093000_create_customers::Migration),
            Box::new(m2025_05_10_093100_create_invoices::Migration),
            Box::new(m2025_05_12_140000_create_field_mappings::Migration),
            Box::new(m2025_05_20_081500_create_sync_jobs::Migration),
        ]
    }
}
