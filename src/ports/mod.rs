//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Ledger
//!
//! - `PaymentRepository` - Payment storage with atomic conditional transitions
//!
//! ## Providers
//!
//! - `ProviderAdapter` - Checkout creation and inbound signal verification
//! - `PurchaseValidator` - Store-side validation of in-app purchase tokens
//!
//! ## External Collaborators
//!
//! - `PackageCatalog` - Read-only package lookup
//! - `PackageActivator` - Applies subscription windows to users

mod package_activator;
mod package_catalog;
mod payment_repository;
mod provider_adapter;
mod purchase_validator;

pub use package_activator::PackageActivator;
pub use package_catalog::PackageCatalog;
pub use payment_repository::{PaymentRepository, TransitionResult};
pub use provider_adapter::{
    CheckoutContext, CheckoutSession, ProviderAdapter, ProviderError, ProviderErrorCode,
};
pub use purchase_validator::{ProductPurchase, PurchaseState, PurchaseValidator};
