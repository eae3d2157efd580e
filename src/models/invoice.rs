//! Invoice entity model
//!
//! Reconciled invoice records, keyed like customers by
//! (tenant, provider, remote entity id).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    /// Unique identifier for the invoice row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Name of the provider this record was pulled from
    pub provider_name: String,

    /// Provider's entity id (QuickBooks `Id`, Zoho `invoice_id`)
    pub remote_id: String,

    /// Provider's id for the invoiced customer
    pub customer_remote_id: Option<String>,

    /// Human-facing invoice number (QuickBooks DocNumber)
    pub invoice_number: Option<String>,

    pub invoice_date: Option<Date>,
    pub due_date: Option<Date>,

    /// Invoice total; absent provider values default to zero
    pub amount: f64,

    /// Outstanding balance; absent provider values default to zero
    pub balance: f64,

    /// Original provider payload
    #[sea_orm(column_type = "JsonBinary")]
    pub raw: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
