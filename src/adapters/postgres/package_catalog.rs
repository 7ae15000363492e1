//! PostgreSQL implementation of PackageCatalog.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, PackageId};
use crate::domain::subscription::Package;
use crate::ports::PackageCatalog;

/// Reads packages from the `packages` table.
pub struct PostgresPackageCatalog {
    pool: PgPool,
}

impl PostgresPackageCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    id: String,
    name: String,
    price: i64,
    duration_days: i32,
    benefits: Json<Vec<String>>,
    store_product_id: Option<String>,
}

impl TryFrom<PackageRow> for Package {
    type Error = DomainError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        let duration_days = u32::try_from(row.duration_days).map_err(|_| {
            DomainError::database(format!("Invalid duration_days: {}", row.duration_days))
        })?;
        let id = PackageId::new(row.id)?;
        let mut package = Package::new(id, row.name, row.price, duration_days, row.benefits.0)?;
        package.store_product_id = row.store_product_id;
        Ok(package)
    }
}

#[async_trait]
impl PackageCatalog for PostgresPackageCatalog {
    async fn find_package(&self, id: &PackageId) -> Result<Option<Package>, DomainError> {
        let row: Option<PackageRow> = sqlx::query_as(
            r#"
            SELECT id, name, price, duration_days, benefits, store_product_id
            FROM packages
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find package: {}", e)))?;

        row.map(Package::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(duration_days: i32) -> PackageRow {
        PackageRow {
            id: "pkg-yearly".to_string(),
            name: "Premium Yearly".to_string(),
            price: 899_000,
            duration_days,
            benefits: Json(vec!["no_ads".to_string()]),
            store_product_id: Some("premium_yearly".to_string()),
        }
    }

    #[test]
    fn row_converts_to_package() {
        let package = Package::try_from(row(365)).unwrap();
        assert_eq!(package.duration_days, 365);
        assert_eq!(package.benefits, vec!["no_ads"]);
        assert_eq!(package.store_product_id.as_deref(), Some("premium_yearly"));
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert!(Package::try_from(row(-1)).is_err());
    }
}
