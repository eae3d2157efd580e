//! # OAuth State Model
//!
//! This module contains the OAuth state entity for storing OAuth flow state
//! tokens server-side, keyed by a random nonce with explicit expiry.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth State entity for storing OAuth flow state tokens
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant ID that owns this OAuth state
    pub tenant_id: Uuid,

    /// Provider name (e.g. "quickbooks_online")
    pub provider_name: String,

    /// State token generated for CSRF protection
    pub state: String,

    /// Expiration timestamp
    pub expires_at: DateTimeWithTimeZone,

    /// When the state was created
    pub created_at: DateTimeWithTimeZone,

    /// When the state was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
