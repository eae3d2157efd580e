//! # Reconciler
//!
//! Maps raw provider records onto the local Customer/Invoice schema and
//! upserts them idempotently, keyed by (tenant, provider, remote entity id).
//! Each batch runs inside a single transaction: a mid-batch failure rolls the
//! whole batch back and the next sync run redoes it, which is safe because
//! the upsert converges. Malformed records are skipped with a recorded
//! reason and never abort the batch.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{customer, field_mapping, integration, invoice};
use crate::providers::{EntityKind, ProviderKind};

/// One record rejected during reconciliation, with the reason recorded.
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    /// Position of the record in the fetched batch
    pub index: usize,
    /// Remote id when one could be extracted before rejection
    pub remote_id: Option<String>,
    pub reason: String,
}

/// Outcome of reconciling one batch.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub created: u64,
    pub updated: u64,
    pub skipped: Vec<SkippedRecord>,
    /// Records whose payload lacked a field a required mapping points at
    pub flagged_mappings: u64,
}

impl ReconcileSummary {
    pub fn upserted(&self) -> u64 {
        self.created + self.updated
    }
}

/// Errors that abort a whole batch (and roll its transaction back).
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("integration references unknown provider '{0}'")]
    UnknownProvider(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Reconcile a batch of raw provider records into local storage.
///
/// Writes are scoped to the integration's tenant-provider pair; no
/// cross-tenant row is ever touched.
#[instrument(skip_all, fields(
    tenant_id = %integration.tenant_id,
    provider = %integration.provider_name,
    entity = %entity,
    batch = records.len()
))]
pub async fn reconcile(
    db: &DatabaseConnection,
    integration: &integration::Model,
    entity: EntityKind,
    records: &[JsonValue],
) -> Result<ReconcileSummary, ReconcileError> {
    let provider = ProviderKind::parse(&integration.provider_name)
        .ok_or_else(|| ReconcileError::UnknownProvider(integration.provider_name.clone()))?;

    // Required mappings are loaded outside the transaction; they only inform
    // the payload-shape flagging below.
    let required_mappings = field_mapping::Entity::find()
        .filter(field_mapping::Column::TenantId.eq(integration.tenant_id))
        .filter(field_mapping::Column::ProviderName.eq(provider.as_str()))
        .filter(field_mapping::Column::EntityKind.eq(entity.as_str()))
        .filter(field_mapping::Column::IsRequired.eq(true))
        .all(db)
        .await?;

    let mut summary = ReconcileSummary::default();
    let txn = db.begin().await?;

    for (index, record) in records.iter().enumerate() {
        for mapping in &required_mappings {
            if mapping.provider_field.is_empty() {
                continue;
            }
            if get_path(record, &mapping.provider_field).is_none() {
                warn!(
                    index,
                    local_field = %mapping.local_field,
                    provider_field = %mapping.provider_field,
                    "Record is missing a field declared required by its mapping"
                );
                summary.flagged_mappings += 1;
            }
        }

        match entity {
            EntityKind::Customer => match map_customer(provider, record) {
                Ok(normalized) => {
                    let created =
                        upsert_customer(&txn, integration, provider, &normalized, record).await?;
                    if created {
                        summary.created += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                Err(reason) => {
                    warn!(index, reason = %reason, "Skipping malformed customer record");
                    summary.skipped.push(SkippedRecord {
                        index,
                        remote_id: extract_remote_id(provider, entity, record),
                        reason,
                    });
                }
            },
            EntityKind::Invoice => match map_invoice(provider, record) {
                Ok(normalized) => {
                    let created =
                        upsert_invoice(&txn, integration, provider, &normalized, record).await?;
                    if created {
                        summary.created += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                Err(reason) => {
                    warn!(index, reason = %reason, "Skipping malformed invoice record");
                    summary.skipped.push(SkippedRecord {
                        index,
                        remote_id: extract_remote_id(provider, entity, record),
                        reason,
                    });
                }
            },
        }
    }

    txn.commit().await?;

    info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped.len(),
        "Reconciled batch"
    );

    Ok(summary)
}

/// Normalized customer fields extracted from a raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCustomer {
    pub remote_id: String,
    pub display_name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
}

/// Normalized invoice fields extracted from a raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInvoice {
    pub remote_id: String,
    pub customer_remote_id: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount: f64,
    pub balance: f64,
}

/// Walk a dot-separated path into a JSON object.
fn get_path<'a>(record: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    if current.is_null() { None } else { Some(current) }
}

/// Stringify an id value; providers are inconsistent about numbers vs strings.
fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(record: &JsonValue, path: &str) -> Option<String> {
    get_path(record, path)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numeric fields default to zero when absent; a present non-numeric value
/// is malformed.
fn numeric_field(record: &JsonValue, path: &str) -> Result<f64, String> {
    match get_path(record, path) {
        None => Ok(0.0),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| format!("field '{}' is not numeric: {}", path, value)),
    }
}

/// Date fields must parse as YYYY-MM-DD when present; otherwise the record
/// is rejected.
fn date_field(record: &JsonValue, path: &str) -> Result<Option<NaiveDate>, String> {
    match get_path(record, path) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .as_str()
                .ok_or_else(|| format!("field '{}' is not a date string: {}", path, value))?;
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| format!("field '{}' has unparseable date '{}'", path, raw))
        }
    }
}

fn extract_remote_id(provider: ProviderKind, entity: EntityKind, record: &JsonValue) -> Option<String> {
    let key = match (provider, entity) {
        (ProviderKind::QuickBooksOnline, _) => "Id",
        (ProviderKind::ZohoBooks, EntityKind::Customer) => "contact_id",
        (ProviderKind::ZohoBooks, EntityKind::Invoice) => "invoice_id",
    };
    get_path(record, key).and_then(id_string)
}

/// Map a raw customer record into the local schema.
pub fn map_customer(
    provider: ProviderKind,
    record: &JsonValue,
) -> Result<NormalizedCustomer, String> {
    match provider {
        ProviderKind::QuickBooksOnline => {
            let remote_id = get_path(record, "Id")
                .and_then(id_string)
                .ok_or_else(|| "missing remote identifier".to_string())?;

            Ok(NormalizedCustomer {
                remote_id,
                display_name: string_field(record, "DisplayName").unwrap_or_default(),
                company_name: string_field(record, "CompanyName"),
                email: string_field(record, "PrimaryEmailAddr.Address"),
                phone: string_field(record, "PrimaryPhone.FreeFormNumber"),
                country: string_field(record, "BillAddr.Country"),
                city: string_field(record, "BillAddr.City"),
                state: string_field(record, "BillAddr.CountrySubDivisionCode"),
                street_address: string_field(record, "BillAddr.Line1"),
                postal_code: string_field(record, "BillAddr.PostalCode"),
            })
        }
        ProviderKind::ZohoBooks => {
            let remote_id = get_path(record, "contact_id")
                .and_then(id_string)
                .ok_or_else(|| "missing remote identifier".to_string())?;

            Ok(NormalizedCustomer {
                remote_id,
                display_name: string_field(record, "contact_name").unwrap_or_default(),
                company_name: string_field(record, "company_name"),
                email: string_field(record, "email"),
                phone: string_field(record, "phone"),
                country: string_field(record, "billing_address.country"),
                city: string_field(record, "billing_address.city"),
                state: string_field(record, "billing_address.state"),
                street_address: string_field(record, "billing_address.address"),
                postal_code: string_field(record, "billing_address.zip"),
            })
        }
    }
}

/// Map a raw invoice record into the local schema.
pub fn map_invoice(
    provider: ProviderKind,
    record: &JsonValue,
) -> Result<NormalizedInvoice, String> {
    match provider {
        ProviderKind::QuickBooksOnline => {
            let remote_id = get_path(record, "Id")
                .and_then(id_string)
                .ok_or_else(|| "missing remote identifier".to_string())?;

            Ok(NormalizedInvoice {
                remote_id,
                customer_remote_id: get_path(record, "CustomerRef.value").and_then(id_string),
                invoice_number: string_field(record, "DocNumber"),
                invoice_date: date_field(record, "TxnDate")?,
                due_date: date_field(record, "DueDate")?,
                amount: numeric_field(record, "TotalAmt")?,
                balance: numeric_field(record, "Balance")?,
            })
        }
        ProviderKind::ZohoBooks => {
            let remote_id = get_path(record, "invoice_id")
                .and_then(id_string)
                .ok_or_else(|| "missing remote identifier".to_string())?;

            Ok(NormalizedInvoice {
                remote_id,
                customer_remote_id: get_path(record, "customer_id").and_then(id_string),
                invoice_number: string_field(record, "invoice_number"),
                invoice_date: date_field(record, "date")?,
                due_date: date_field(record, "due_date")?,
                amount: numeric_field(record, "total")?,
                balance: numeric_field(record, "balance")?,
            })
        }
    }
}

async fn upsert_customer<C: ConnectionTrait>(
    conn: &C,
    integration: &integration::Model,
    provider: ProviderKind,
    normalized: &NormalizedCustomer,
    raw: &JsonValue,
) -> Result<bool, sea_orm::DbErr> {
    let now = Utc::now();

    let existing = customer::Entity::find()
        .filter(customer::Column::TenantId.eq(integration.tenant_id))
        .filter(customer::Column::ProviderName.eq(provider.as_str()))
        .filter(customer::Column::RemoteId.eq(normalized.remote_id.as_str()))
        .one(conn)
        .await?;

    match existing {
        Some(model) => {
            let mut active: customer::ActiveModel = model.into();
            active.display_name = Set(normalized.display_name.clone());
            active.company_name = Set(normalized.company_name.clone());
            active.email = Set(normalized.email.clone());
            active.phone = Set(normalized.phone.clone());
            active.country = Set(normalized.country.clone());
            active.city = Set(normalized.city.clone());
            active.state = Set(normalized.state.clone());
            active.street_address = Set(normalized.street_address.clone());
            active.postal_code = Set(normalized.postal_code.clone());
            active.raw = Set(raw.clone());
            active.updated_at = Set(now.into());
            active.update(conn).await?;
            Ok(false)
        }
        None => {
            let active = customer::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(integration.tenant_id),
                provider_name: Set(provider.as_str().to_string()),
                remote_id: Set(normalized.remote_id.clone()),
                display_name: Set(normalized.display_name.clone()),
                company_name: Set(normalized.company_name.clone()),
                email: Set(normalized.email.clone()),
                phone: Set(normalized.phone.clone()),
                country: Set(normalized.country.clone()),
                city: Set(normalized.city.clone()),
                state: Set(normalized.state.clone()),
                street_address: Set(normalized.street_address.clone()),
                postal_code: Set(normalized.postal_code.clone()),
                raw: Set(raw.clone()),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };
            active.insert(conn).await?;
            Ok(true)
        }
    }
}

async fn upsert_invoice<C: ConnectionTrait>(
    conn: &C,
    integration: &integration::Model,
    provider: ProviderKind,
    normalized: &NormalizedInvoice,
    raw: &JsonValue,
) -> Result<bool, sea_orm::DbErr> {
    let now = Utc::now();

    let existing = invoice::Entity::find()
        .filter(invoice::Column::TenantId.eq(integration.tenant_id))
        .filter(invoice::Column::ProviderName.eq(provider.as_str()))
        .filter(invoice::Column::RemoteId.eq(normalized.remote_id.as_str()))
        .one(conn)
        .await?;

    match existing {
        Some(model) => {
            let mut active: invoice::ActiveModel = model.into();
            active.customer_remote_id = Set(normalized.customer_remote_id.clone());
            active.invoice_number = Set(normalized.invoice_number.clone());
            active.invoice_date = Set(normalized.invoice_date);
            active.due_date = Set(normalized.due_date);
            active.amount = Set(normalized.amount);
            active.balance = Set(normalized.balance);
            active.raw = Set(raw.clone());
            active.updated_at = Set(now.into());
            active.update(conn).await?;
            Ok(false)
        }
        None => {
            let active = invoice::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(integration.tenant_id),
                provider_name: Set(provider.as_str().to_string()),
                remote_id: Set(normalized.remote_id.clone()),
                customer_remote_id: Set(normalized.customer_remote_id.clone()),
                invoice_number: Set(normalized.invoice_number.clone()),
                invoice_date: Set(normalized.invoice_date),
                due_date: Set(normalized.due_date),
                amount: Set(normalized.amount),
                balance: Set(normalized.balance),
                raw: Set(raw.clone()),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };
            active.insert(conn).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qbo_customer_maps_address_and_contacts() {
        let record = json!({
            "Id": "1",
            "DisplayName": "Acme",
            "CompanyName": "Acme Corp",
            "PrimaryEmailAddr": {"Address": "billing@acme.test"},
            "PrimaryPhone": {"FreeFormNumber": "+1 555 0100"},
            "BillAddr": {
                "Line1": "1 Main St",
                "City": "Springfield",
                "CountrySubDivisionCode": "IL",
                "PostalCode": "62701",
                "Country": "US"
            }
        });

        let normalized =
            map_customer(ProviderKind::QuickBooksOnline, &record).expect("maps cleanly");
        assert_eq!(normalized.remote_id, "1");
        assert_eq!(normalized.display_name, "Acme");
        assert_eq!(normalized.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(normalized.email.as_deref(), Some("billing@acme.test"));
        assert_eq!(normalized.city.as_deref(), Some("Springfield"));
        assert_eq!(normalized.postal_code.as_deref(), Some("62701"));
    }

    #[test]
    fn customer_without_remote_id_is_rejected() {
        let record = json!({"DisplayName": "No Id"});
        let err = map_customer(ProviderKind::QuickBooksOnline, &record).unwrap_err();
        assert_eq!(err, "missing remote identifier");
    }

    #[test]
    fn numeric_id_is_stringified() {
        let record = json!({"Id": 42, "DisplayName": "Numeric"});
        let normalized =
            map_customer(ProviderKind::QuickBooksOnline, &record).expect("maps cleanly");
        assert_eq!(normalized.remote_id, "42");
    }

    #[test]
    fn zoho_customer_uses_contact_fields() {
        let record = json!({
            "contact_id": "460000000026049",
            "contact_name": "Globex",
            "company_name": "Globex LLC",
            "email": "ap@globex.test",
            "billing_address": {"city": "Berlin", "zip": "10115", "country": "DE"}
        });

        let normalized = map_customer(ProviderKind::ZohoBooks, &record).expect("maps cleanly");
        assert_eq!(normalized.remote_id, "460000000026049");
        assert_eq!(normalized.display_name, "Globex");
        assert_eq!(normalized.city.as_deref(), Some("Berlin"));
    }

    #[test]
    fn qbo_invoice_maps_amounts_and_dates() {
        let record = json!({
            "Id": "130",
            "DocNumber": "1037",
            "TxnDate": "2025-03-14",
            "DueDate": "2025-04-13",
            "TotalAmt": 362.07,
            "Balance": 100.0,
            "CustomerRef": {"value": "1"}
        });

        let normalized =
            map_invoice(ProviderKind::QuickBooksOnline, &record).expect("maps cleanly");
        assert_eq!(normalized.remote_id, "130");
        assert_eq!(normalized.customer_remote_id.as_deref(), Some("1"));
        assert_eq!(normalized.invoice_number.as_deref(), Some("1037"));
        assert_eq!(
            normalized.invoice_date,
            NaiveDate::from_ymd_opt(2025, 3, 14)
        );
        assert_eq!(normalized.amount, 362.07);
        assert_eq!(normalized.balance, 100.0);
    }

    #[test]
    fn absent_numeric_fields_default_to_zero() {
        let record = json!({"Id": "7", "TxnDate": "2025-01-01"});
        let normalized =
            map_invoice(ProviderKind::QuickBooksOnline, &record).expect("maps cleanly");
        assert_eq!(normalized.amount, 0.0);
        assert_eq!(normalized.balance, 0.0);
    }

    #[test]
    fn unparseable_date_rejects_the_record() {
        let record = json!({"Id": "8", "TxnDate": "14/03/2025"});
        let err = map_invoice(ProviderKind::QuickBooksOnline, &record).unwrap_err();
        assert!(err.contains("TxnDate"));
        assert!(err.contains("unparseable"));
    }

    #[test]
    fn non_string_date_rejects_the_record() {
        let record = json!({"Id": "9", "DueDate": 20250314});
        let err = map_invoice(ProviderKind::QuickBooksOnline, &record).unwrap_err();
        assert!(err.contains("DueDate"));
    }

    #[test]
    fn absent_dates_are_allowed() {
        let record = json!({"Id": "10", "TotalAmt": 12.5});
        let normalized =
            map_invoice(ProviderKind::QuickBooksOnline, &record).expect("maps cleanly");
        assert!(normalized.invoice_date.is_none());
        assert!(normalized.due_date.is_none());
    }

    #[test]
    fn zoho_invoice_uses_books_field_names() {
        let record = json!({
            "invoice_id": "982000000567114",
            "invoice_number": "INV-00003",
            "customer_id": "982000000567001",
            "date": "2025-02-01",
            "due_date": "2025-03-03",
            "total": 150.0,
            "balance": 0.0
        });

        let normalized = map_invoice(ProviderKind::ZohoBooks, &record).expect("maps cleanly");
        assert_eq!(normalized.remote_id, "982000000567114");
        assert_eq!(
            normalized.customer_remote_id.as_deref(),
            Some("982000000567001")
        );
        assert_eq!(normalized.due_date, NaiveDate::from_ymd_opt(2025, 3, 3));
    }

    #[test]
    fn get_path_walks_nested_objects() {
        let record = json!({"a": {"b": {"c": "deep"}}, "n": null});
        assert_eq!(
            get_path(&record, "a.b.c").and_then(|v| v.as_str()),
            Some("deep")
        );
        assert!(get_path(&record, "a.b.missing").is_none());
        assert!(get_path(&record, "n").is_none());
    }
}
