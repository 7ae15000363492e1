//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod payment;

pub use payment::{
    // Commands
    ActivatePackageHandler, CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
    CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult,
    // Reconciliation
    ProviderRegistry, ReconciliationEngine, DEFAULT_VERIFY_TIMEOUT,
    // Queries
    GetPaymentHandler, GetPaymentQuery,
};
