//! # Field Mapping Repository
//!
//! Row access for field_mappings plus installation of the built-in default
//! mapping set when an integration is first connected.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::field_mapping::{self, Entity as FieldMapping};
use crate::providers::{EntityKind, ProviderKind};

/// One entry of a default mapping set.
struct DefaultMapping {
    local_field: &'static str,
    provider_field: &'static str,
    is_required: bool,
}

/// Default QuickBooks Online Invoice mappings, as shipped by the product.
const QBO_INVOICE_DEFAULTS: &[DefaultMapping] = &[
    DefaultMapping {
        local_field: "customer_remote_id",
        provider_field: "CustomerRef.value",
        is_required: true,
    },
    DefaultMapping {
        local_field: "invoice_number",
        provider_field: "DocNumber",
        is_required: true,
    },
    DefaultMapping {
        local_field: "invoice_date",
        provider_field: "TxnDate",
        is_required: true,
    },
    DefaultMapping {
        local_field: "amount",
        provider_field: "TotalAmt",
        is_required: true,
    },
    DefaultMapping {
        local_field: "balance",
        provider_field: "Balance",
        is_required: false,
    },
    DefaultMapping {
        local_field: "due_date",
        provider_field: "DueDate",
        is_required: true,
    },
];

/// Repository for field mapping operations
#[derive(Clone)]
pub struct FieldMappingRepository {
    db: Arc<DatabaseConnection>,
}

impl FieldMappingRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// List mappings for one (tenant, provider, entity) scope.
    pub async fn list_for(
        &self,
        tenant_id: &Uuid,
        provider: ProviderKind,
        entity: EntityKind,
    ) -> Result<Vec<field_mapping::Model>, sea_orm::DbErr> {
        FieldMapping::find()
            .filter(field_mapping::Column::TenantId.eq(*tenant_id))
            .filter(field_mapping::Column::ProviderName.eq(provider.as_str()))
            .filter(field_mapping::Column::EntityKind.eq(entity.as_str()))
            .all(&*self.db)
            .await
    }

    /// Create or update one mapping row, keyed by its scope + local field.
    pub async fn upsert(
        &self,
        tenant_id: &Uuid,
        provider: ProviderKind,
        entity: EntityKind,
        local_field: &str,
        provider_field: &str,
        is_required: bool,
        description: Option<&str>,
    ) -> Result<field_mapping::Model, sea_orm::DbErr> {
        let now = Utc::now();

        let existing = FieldMapping::find()
            .filter(field_mapping::Column::TenantId.eq(*tenant_id))
            .filter(field_mapping::Column::ProviderName.eq(provider.as_str()))
            .filter(field_mapping::Column::EntityKind.eq(entity.as_str()))
            .filter(field_mapping::Column::LocalField.eq(local_field))
            .one(&*self.db)
            .await?;

        match existing {
            Some(model) => {
                let id = model.id;
                let mut active: field_mapping::ActiveModel = model.into();
                active.provider_field = Set(provider_field.to_string());
                active.is_required = Set(is_required);
                active.description = Set(description.map(str::to_string));
                active.updated_at = Set(now.into());
                active.update(&*self.db).await?;

                FieldMapping::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("field mapping {}", id)))
            }
            None => {
                let id = Uuid::new_v4();
                let active = field_mapping::ActiveModel {
                    id: Set(id),
                    tenant_id: Set(*tenant_id),
                    provider_name: Set(provider.as_str().to_string()),
                    entity_kind: Set(entity.as_str().to_string()),
                    local_field: Set(local_field.to_string()),
                    provider_field: Set(provider_field.to_string()),
                    is_required: Set(is_required),
                    description: Set(description.map(str::to_string)),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };
                active.insert(&*self.db).await?;

                FieldMapping::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| sea_orm::DbErr::RecordNotFound(format!("field mapping {}", id)))
            }
        }
    }

    /// Install the default invoice mappings for a freshly connected
    /// QuickBooks integration. Idempotent; reconnecting refreshes the rows.
    pub async fn install_qbo_invoice_defaults(
        &self,
        tenant_id: &Uuid,
    ) -> Result<(), sea_orm::DbErr> {
        for mapping in QBO_INVOICE_DEFAULTS {
            self.upsert(
                tenant_id,
                ProviderKind::QuickBooksOnline,
                EntityKind::Invoice,
                mapping.local_field,
                mapping.provider_field,
                mapping.is_required,
                Some(&format!("Default QBO mapping for {}", mapping.local_field)),
            )
            .await?;
        }

        tracing::info!(
            tenant_id = %tenant_id,
            count = QBO_INVOICE_DEFAULTS.len(),
            "Installed default QuickBooks invoice field mappings"
        );

        Ok(())
    }
}
