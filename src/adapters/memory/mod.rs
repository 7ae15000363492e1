//! In-memory adapters for tests and local development.

mod package_activator;
mod package_catalog;
mod payment_repository;

pub use package_activator::{ActiveSubscription, InMemoryPackageActivator};
pub use package_catalog::InMemoryPackageCatalog;
pub use payment_repository::InMemoryPaymentRepository;
