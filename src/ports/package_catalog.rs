//! Package catalog port (read-only).

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PackageId};
use crate::domain::subscription::Package;

/// Read-only lookup of purchasable packages.
#[async_trait]
pub trait PackageCatalog: Send + Sync {
    /// Returns `None` if the package does not exist.
    async fn find_package(&self, id: &PackageId) -> Result<Option<Package>, DomainError>;
}
