//! CreateCheckoutHandler - Creates a payment and the provider checkout for it.

use std::sync::Arc;

use crate::domain::foundation::{PackageId, UserId};
use crate::domain::payment::{Payment, PaymentCode, PaymentError, ProviderKind};
use crate::ports::{CheckoutContext, PaymentRepository};

use super::{CreatePaymentCommand, CreatePaymentHandler, ProviderRegistry};

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub package_id: PackageId,
    pub provider: ProviderKind,
    pub client_ip: String,
    pub locale: Option<String>,
    pub bank_code: Option<String>,
}

/// What the client needs to continue at the provider.
#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    pub payment_code: PaymentCode,
    pub external_reference: String,
    pub payment: Payment,
}

/// Handler for checkout creation.
///
/// The payment is stored PENDING first, then the adapter builds the external
/// checkout, and any provider references it returns are written before the
/// reference is handed to the client.
pub struct CreateCheckoutHandler {
    repository: Arc<dyn PaymentRepository>,
    create_payment: CreatePaymentHandler,
    providers: ProviderRegistry,
}

impl CreateCheckoutHandler {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        create_payment: CreatePaymentHandler,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            repository,
            create_payment,
            providers,
        }
    }

    pub async fn handle(&self, cmd: CreateCheckoutCommand) -> Result<CreateCheckoutResult, PaymentError> {
        let adapter = self
            .providers
            .get(cmd.provider)
            .ok_or(PaymentError::ProviderNotConfigured(cmd.provider))?;

        let created = self
            .create_payment
            .handle(CreatePaymentCommand {
                user_id: cmd.user_id,
                package_id: cmd.package_id,
                provider: cmd.provider,
            })
            .await?;
        let mut payment = created.payment;

        let context = CheckoutContext {
            package_name: created.package.name,
            client_ip: cmd.client_ip,
            locale: cmd.locale,
            bank_code: cmd.bank_code,
            store_product_id: created.package.store_product_id,
        };
        let session = adapter
            .create_checkout(&payment, &context)
            .await
            .map_err(|e| {
                tracing::error!(
                    payment_code = %payment.code,
                    provider = %cmd.provider,
                    error = %e,
                    "Checkout creation failed"
                );
                PaymentError::provider(cmd.provider, e.message, e.retryable)
            })?;

        if !session.correlation_patch.is_empty() {
            let patched = self
                .repository
                .patch_correlation(&payment.id, &session.correlation_patch)
                .await?;
            if !patched {
                return Err(PaymentError::infrastructure(format!(
                    "payment {} left PENDING before its checkout was recorded",
                    payment.code
                )));
            }
            payment.correlation.merge(&session.correlation_patch);
        }

        Ok(CreateCheckoutResult {
            payment_code: payment.code.clone(),
            external_reference: session.external_reference,
            payment,
        })
    }
}
