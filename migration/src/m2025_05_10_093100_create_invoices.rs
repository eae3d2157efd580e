//! Migration to create the invoices table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoices::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invoices::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Invoices::ProviderName).text().not_null())
                    .col(ColumnDef::new(Invoices::RemoteId).text().not_null())
                    .col(ColumnDef::new(Invoices::CustomerRemoteId).text().null())
                    .col(ColumnDef::new(Invoices::InvoiceNumber).text().null())
                    .col(ColumnDef::new(Invoices::InvoiceDate).date().null())
                    .col(ColumnDef::new(Invoices::DueDate).date().null())
                    .col(
                        ColumnDef::new(Invoices::Amount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Invoices::Balance)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Invoices::Raw).json_binary().not_null())
                    .col(
                        ColumnDef::new(Invoices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Invoices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoices_tenant_id")
                            .from(Invoices::Table, Invoices::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_invoices_tenant_provider_remote")
                    .table(Invoices::Table)
                    .col(Invoices::TenantId)
                    .col(Invoices::ProviderName)
                    .col(Invoices::RemoteId)
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
                    .name("idx_invoices_tenant_provider_remote")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Invoices {
    Table,
    Id,
    TenantId,
    ProviderName,
    RemoteId,
    CustomerRemoteId,
    InvoiceNumber,
    InvoiceDate,
    DueDate,
    Amount,
    Balance,
    Raw,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
