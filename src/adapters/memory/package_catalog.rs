//! In-memory package catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, PackageId};
use crate::domain::subscription::Package;
use crate::ports::PackageCatalog;

/// Fixed set of packages held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPackageCatalog {
    packages: Arc<RwLock<HashMap<PackageId, Package>>>,
}

impl InMemoryPackageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let map = packages.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            packages: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn add(&self, package: Package) {
        self.packages.write().await.insert(package.id.clone(), package);
    }
}

#[async_trait]
impl PackageCatalog for InMemoryPackageCatalog {
    async fn find_package(&self, id: &PackageId) -> Result<Option<Package>, DomainError> {
        Ok(self.packages.read().await.get(id).cloned())
    }
}
