//! PostgreSQL implementation of PackageActivator.
//!
//! Upserts the user's row in `user_subscriptions`; replaying the same window
//! rewrites identical values.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, PackageId, UserId};
use crate::domain::subscription::SubscriptionWindow;
use crate::ports::PackageActivator;

pub struct PostgresPackageActivator {
    pool: PgPool,
}

impl PostgresPackageActivator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageActivator for PostgresPackageActivator {
    async fn activate_package(
        &self,
        user_id: &UserId,
        package_id: &PackageId,
        window: &SubscriptionWindow,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO user_subscriptions (user_id, package_id, plan, starts_at, ends_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (user_id) DO UPDATE SET
                package_id = EXCLUDED.package_id,
                plan = EXCLUDED.plan,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                updated_at = now()
            "#,
        )
        .bind(user_id.as_str())
        .bind(package_id.as_str())
        .bind(window.plan.as_str())
        .bind(window.starts_at.as_datetime())
        .bind(window.ends_at.as_ref().map(|end| *end.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::ActivationFailed,
                format!("Failed to activate package: {}", e),
            )
            .with_detail("user_id", user_id.as_str())
            .with_detail("package_id", package_id.as_str())
        })?;

        Ok(())
    }
}
