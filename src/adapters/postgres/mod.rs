//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresPaymentRepository` - Payment ledger with conditional transitions
//! - `PostgresPackageCatalog` - Package lookup from `packages`
//! - `PostgresPackageActivator` - Subscription upsert into `user_subscriptions`

mod package_activator;
mod package_catalog;
mod payment_repository;

pub use package_activator::PostgresPackageActivator;
pub use package_catalog::PostgresPackageCatalog;
pub use payment_repository::PostgresPaymentRepository;
