//! Payment handlers.
//!
//! Commands: create a payment, create a checkout, reconcile an inbound signal.
//! Queries: look a payment up by code.

mod activate_package;
mod create_checkout;
mod create_payment;
mod get_payment;
mod provider_registry;
mod reconcile;

pub use activate_package::ActivatePackageHandler;
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use create_payment::{CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult};
pub use get_payment::{GetPaymentHandler, GetPaymentQuery};
pub use provider_registry::ProviderRegistry;
pub use reconcile::{ReconciliationEngine, DEFAULT_VERIFY_TIMEOUT};
