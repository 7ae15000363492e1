//! CreatePaymentHandler - Creates a PENDING payment for a package.

use std::sync::Arc;

use crate::domain::foundation::{PackageId, PaymentId, UserId};
use crate::domain::payment::{Payment, PaymentError, ProviderKind};
use crate::domain::subscription::Package;
use crate::ports::{PackageCatalog, PaymentRepository};

/// Command to create a payment.
#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub user_id: UserId,
    pub package_id: PackageId,
    pub provider: ProviderKind,
}

/// The stored payment and the package it pays for.
#[derive(Debug, Clone)]
pub struct CreatePaymentResult {
    pub payment: Payment,
    pub package: Package,
}

/// Ledger `create`: looks up the package price and inserts a PENDING payment
/// whose code is final from the first write.
pub struct CreatePaymentHandler {
    repository: Arc<dyn PaymentRepository>,
    catalog: Arc<dyn PackageCatalog>,
}

impl CreatePaymentHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>, catalog: Arc<dyn PackageCatalog>) -> Self {
        Self {
            repository,
            catalog,
        }
    }

    pub async fn handle(&self, cmd: CreatePaymentCommand) -> Result<CreatePaymentResult, PaymentError> {
        let package = self
            .catalog
            .find_package(&cmd.package_id)
            .await?
            .ok_or_else(|| PaymentError::PackageNotFound(cmd.package_id.clone()))?;

        let payment = Payment::new_pending(
            PaymentId::new(),
            cmd.user_id,
            cmd.package_id,
            cmd.provider,
            package.price,
        )?;
        self.repository.insert(&payment).await?;

        tracing::info!(
            payment_code = %payment.code,
            provider = %payment.provider,
            amount = payment.amount,
            "Payment created"
        );

        Ok(CreatePaymentResult { payment, package })
    }
}
