//! In-memory payment ledger.
//!
//! Same compare-and-set semantics as the PostgreSQL ledger: the check for
//! PENDING and the write happen under one write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, Timestamp};
use crate::domain::payment::{
    CorrelationFields, CorrelationKey, Payment, PaymentCode, PaymentStatus, ProviderKind,
};
use crate::ports::{PaymentRepository, TransitionResult};

/// In-memory `PaymentRepository` for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments.
    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut payments = self.payments.write().await;
        if payments.values().any(|p| p.code == payment.code) {
            return Err(DomainError::new(
                ErrorCode::DuplicatePaymentCode,
                format!("Payment code {} already exists", payment.code),
            ));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_code(&self, code: &PaymentCode) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| &p.code == code)
            .cloned())
    }

    async fn find_by_correlation(
        &self,
        provider: ProviderKind,
        key: &CorrelationKey,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.provider == provider && key.matches(p))
            .cloned())
    }

    async fn try_transition(
        &self,
        id: &PaymentId,
        to: PaymentStatus,
        patch: &CorrelationFields,
        at: Timestamp,
    ) -> Result<TransitionResult, DomainError> {
        if to.is_pending() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Cannot transition a payment to pending",
            ));
        }

        let mut payments = self.payments.write().await;
        if let Some(token) = patch.purchase_token.as_deref() {
            let taken = payments.values().any(|p| {
                p.id != *id && p.correlation.purchase_token.as_deref() == Some(token)
            });
            if taken {
                return Err(DomainError::new(
                    ErrorCode::PurchaseTokenReused,
                    "Purchase token already redeemed by another payment",
                ));
            }
        }
        let payment = payments.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, format!("Payment not found: {}", id))
        })?;

        if !payment.status.is_pending() {
            return Ok(TransitionResult::AlreadyTerminal(payment.status));
        }

        payment.settle(to, patch, at)?;
        Ok(TransitionResult::Transitioned(payment.clone()))
    }

    async fn patch_correlation(
        &self,
        id: &PaymentId,
        patch: &CorrelationFields,
    ) -> Result<bool, DomainError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(id) {
            Some(payment) if payment.status.is_pending() => {
                payment.correlation.merge(patch);
                payment.updated_at = Timestamp::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
