//! Provider clients
//!
//! This module provides the provider SDK:
//! - The `ProviderClient` trait and the closed `ProviderKind` variant set
//! - The registry mapping variants to configured clients
//! - One implementation per supported accounting provider

pub mod quickbooks;
pub mod registry;
pub mod trait_;
pub mod zoho_books;

pub use quickbooks::QuickBooksClient;
pub use registry::{ProviderRegistry, RegistryError};
pub use trait_::{
    CallbackParams, EntityKind, ExchangedAccount, ProviderApiError, ProviderClient, ProviderKind,
    TokenResponse,
};
pub use zoho_books::ZohoBooksClient;
