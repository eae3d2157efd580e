//! Migration to create the field_mappings table.
//!
//! Declarative correspondence between a local entity field and a provider API
//! field, scoped per (tenant, provider, entity kind).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FieldMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FieldMappings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FieldMappings::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(FieldMappings::ProviderName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FieldMappings::EntityKind).text().not_null())
                    .col(ColumnDef::new(FieldMappings::LocalField).text().not_null())
                    .col(
                        ColumnDef::new(FieldMappings::ProviderField)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FieldMappings::IsRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(FieldMappings::Description).text().null())
                    .col(
                        ColumnDef::new(FieldMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FieldMappings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_field_mappings_tenant_id")
                            .from(FieldMappings::Table, FieldMappings::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_field_mappings_scope_local_field")
                    .table(FieldMappings::Table)
                    .col(FieldMappings::TenantId)
                    .col(FieldMappings::ProviderName)
                    .col(FieldMappings::EntityKind)
                    .col(FieldMappings::LocalField)
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
                    .name("idx_field_mappings_scope_local_field")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(FieldMappings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FieldMappings {
    Table,
    Id,
    TenantId,
    ProviderName,
    EntityKind,
    LocalField,
    ProviderField,
    IsRequired,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
