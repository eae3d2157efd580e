//! Migration to create the customers table.
//!
//! Reconciled customer records, uniquely keyed by
//! (tenant, provider, remote entity id). The original provider payload is
//! retained alongside the normalized columns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Customers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Customers::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Customers::ProviderName).text().not_null())
                    .col(ColumnDef::new(Customers::RemoteId).text().not_null())
                    .col(ColumnDef::new(Customers::DisplayName).text().not_null())
                    .col(ColumnDef::new(Customers::CompanyName).text().null())
                    .col(ColumnDef::new(Customers::Email).text().null())
                    .col(ColumnDef::new(Customers::Phone).text().null())
                    .col(ColumnDef::new(Customers::Country).text().null())
                    .col(ColumnDef::new(Customers::City).text().null())
                    .col(ColumnDef::new(Customers::State).text().null())
                    .col(ColumnDef::new(Customers::StreetAddress).text().null())
                    .col(ColumnDef::new(Customers::PostalCode).text().null())
                    .col(ColumnDef::new(Customers::Raw).json_binary().not_null())
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Customers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customers_tenant_id")
                            .from(Customers::Table, Customers::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customers_tenant_provider_remote")
                    .table(Customers::Table)
                    .col(Customers::TenantId)
                    .col(Customers::ProviderName)
                    .col(Customers::RemoteId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_customers_tenant_provider_remote")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
    TenantId,
    ProviderName,
    RemoteId,
    DisplayName,
    CompanyName,
    Email,
    Phone,
    Country,
    City,
    State,
    StreetAddress,
    PostalCode,
    Raw,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
