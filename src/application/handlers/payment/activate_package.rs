//! ActivatePackageHandler - Grants the subscription a successful payment bought.

use std::sync::Arc;

use crate::domain::payment::{ActivationReport, Payment};
use crate::domain::subscription::SubscriptionWindow;
use crate::ports::{PackageActivator, PackageCatalog};

/// Applies the package of a SUCCESS payment to its user.
///
/// The window starts at the payment's `updated_at`, which is the time of the
/// SUCCESS transition, so activating the same payment again computes the
/// identical window. Failures are reported, never propagated: a paid payment
/// stays SUCCESS whatever happens here.
pub struct ActivatePackageHandler {
    catalog: Arc<dyn PackageCatalog>,
    activator: Arc<dyn PackageActivator>,
}

impl ActivatePackageHandler {
    pub fn new(catalog: Arc<dyn PackageCatalog>, activator: Arc<dyn PackageActivator>) -> Self {
        Self { catalog, activator }
    }

    pub async fn activate(&self, payment: &Payment) -> ActivationReport {
        let package = match self.catalog.find_package(&payment.package_id).await {
            Ok(Some(package)) => package,
            Ok(None) => {
                return self.failed(payment, format!("package {} not found", payment.package_id));
            }
            Err(e) => return self.failed(payment, e.to_string()),
        };

        let window = SubscriptionWindow::compute(package.duration_days, payment.updated_at);

        match self
            .activator
            .activate_package(&payment.user_id, &payment.package_id, &window)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    payment_code = %payment.code,
                    user_id = %payment.user_id,
                    plan = %window.plan,
                    "Package activated"
                );
                ActivationReport::Activated { window }
            }
            Err(e) => self.failed(payment, e.to_string()),
        }
    }

    fn failed(&self, payment: &Payment, reason: String) -> ActivationReport {
        tracing::error!(
            payment_code = %payment.code,
            user_id = %payment.user_id,
            package_id = %payment.package_id,
            reason = %reason,
            "Package activation failed"
        );
        ActivationReport::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPackageActivator, InMemoryPackageCatalog};
    use crate::domain::foundation::{PackageId, PaymentId, Timestamp, UserId};
    use crate::domain::payment::ProviderKind;
    use crate::domain::subscription::{Package, SubscriptionPlan};

    fn package(id: &str, duration_days: u32) -> Package {
        Package::new(PackageId::new(id).unwrap(), id, 99_000, duration_days, vec![]).unwrap()
    }

    fn paid(package_id: &str) -> Payment {
        let mut payment = Payment::new_pending(
            PaymentId::new(),
            UserId::new("user-1").unwrap(),
            PackageId::new(package_id).unwrap(),
            ProviderKind::RedirectIpn,
            99_000,
        )
        .unwrap();
        payment
            .settle(
                crate::domain::payment::PaymentStatus::Success,
                &Default::default(),
                Timestamp::now(),
            )
            .unwrap();
        payment
    }

    fn handler(activator: &InMemoryPackageActivator) -> ActivatePackageHandler {
        let catalog = InMemoryPackageCatalog::with_packages([
            package("pkg-monthly", 30),
            package("pkg-lifetime", 0),
            package("pkg-45", 45),
        ]);
        ActivatePackageHandler::new(Arc::new(catalog), Arc::new(activator.clone()))
    }

    #[tokio::test]
    async fn window_starts_at_settlement_time() {
        let activator = InMemoryPackageActivator::new();
        let payment = paid("pkg-45");

        let report = handler(&activator).activate(&payment).await;

        let ActivationReport::Activated { window } = report else {
            panic!("expected activation");
        };
        assert_eq!(window.plan, SubscriptionPlan::Custom);
        assert_eq!(window.starts_at, payment.updated_at);
        assert_eq!(window.ends_at, Some(payment.updated_at.add_days(45)));

        let stored = activator.subscription_of(&payment.user_id).await.unwrap();
        assert_eq!(stored.window, window);
    }

    #[tokio::test]
    async fn lifetime_package_has_no_end() {
        let activator = InMemoryPackageActivator::new();

        let report = handler(&activator).activate(&paid("pkg-lifetime")).await;

        assert!(matches!(
            report,
            ActivationReport::Activated { window } if window.ends_at.is_none()
                && window.plan == SubscriptionPlan::Lifetime
        ));
    }

    #[tokio::test]
    async fn repeated_activation_computes_same_window() {
        let activator = InMemoryPackageActivator::new();
        let handler = handler(&activator);
        let payment = paid("pkg-monthly");

        let first = handler.activate(&payment).await;
        let second = handler.activate(&payment).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_package_reports_failure() {
        let activator = InMemoryPackageActivator::new();

        let report = handler(&activator).activate(&paid("pkg-retired")).await;

        assert!(matches!(report, ActivationReport::Failed { .. }));
        assert_eq!(activator.activation_count(), 0);
    }

    #[tokio::test]
    async fn user_store_outage_reports_failure() {
        let activator = InMemoryPackageActivator::new();
        activator.set_unavailable(true);

        let report = handler(&activator).activate(&paid("pkg-monthly")).await;

        assert!(matches!(report, ActivationReport::Failed { .. }));
        assert_eq!(activator.activation_count(), 1);
    }
}
