//! Migration to create the tenant_integrations table.
//!
//! A tenant_integrations row holds the encrypted credential bundle and
//! provider-specific data for one (tenant, provider) pair. The remote account
//! identifier is stored in the clear so the exclusivity constraint stays
//! queryable.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantIntegrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantIntegrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::TenantId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::ProviderName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::RemoteId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::CredentialsCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::ProviderDataCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantIntegrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_integrations_tenant_id")
                            .from(TenantIntegrations::Table, TenantIntegrations::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_integrations_provider_name")
                            .from(TenantIntegrations::Table, TenantIntegrations::ProviderName)
                            .to(Providers::Table, Providers::Name)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One integration per (tenant, provider, remote account)
        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_integrations_tenant_provider_remote")
                    .table(TenantIntegrations::Table)
                    .col(TenantIntegrations::TenantId)
                    .col(TenantIntegrations::ProviderName)
                    .col(TenantIntegrations::RemoteId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Lookup path for the remote-account exclusivity check
        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_integrations_provider_remote")
                    .table(TenantIntegrations::Table)
                    .col(TenantIntegrations::ProviderName)
                    .col(TenantIntegrations::RemoteId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_integrations_tenant_id")
                    .table(TenantIntegrations::Table)
                    .col(TenantIntegrations::TenantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tenant_integrations_tenant_provider_remote")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_tenant_integrations_provider_remote")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_tenant_integrations_tenant_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TenantIntegrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantIntegrations {
    Table,
    Id,
    TenantId,
    ProviderName,
    RemoteId,
    CredentialsCiphertext,
    ProviderDataCiphertext,
    IsActive,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Name,
}
