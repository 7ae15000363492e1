//! Payment ledger port.
//!
//! Owns storage of [`Payment`] records and the one write that matters:
//! the conditional transition out of PENDING.
//!
//! # Design
//!
//! - **Single serialization point**: `try_transition` is an atomic
//!   compare-and-set on `status = PENDING`. Concurrent callers race in
//!   storage, never in application memory.
//! - **No deletes**: payments are kept forever.
//! - **Correlation lookups are provider-scoped**: a ZaloPay `app_trans_id`
//!   never matches a PayPal payment.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PaymentId, Timestamp};
use crate::domain::payment::{
    CorrelationFields, CorrelationKey, Payment, PaymentCode, PaymentStatus, ProviderKind,
};

/// Result of a conditional transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// This call moved the payment out of PENDING.
    Transitioned(Payment),

    /// Another writer got there first; carries the status it wrote.
    AlreadyTerminal(PaymentStatus),
}

/// Repository port for the payment ledger.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a new PENDING payment.
    ///
    /// # Errors
    ///
    /// - `DuplicatePaymentCode` if the code is already taken
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    async fn find_by_code(&self, code: &PaymentCode) -> Result<Option<Payment>, DomainError>;

    /// Find the payment of `provider` carrying `key`.
    async fn find_by_correlation(
        &self,
        provider: ProviderKind,
        key: &CorrelationKey,
    ) -> Result<Option<Payment>, DomainError>;

    /// Atomically move a PENDING payment to `to`, merging `patch` into its
    /// correlation fields and stamping `at` as the update time.
    ///
    /// Exactly one concurrent caller per payment receives `Transitioned`;
    /// every other caller receives `AlreadyTerminal` with the winner's status.
    ///
    /// # Errors
    ///
    /// - `PaymentNotFound` if no payment has this id
    /// - `InvalidStateTransition` if `to` is PENDING
    /// - `PurchaseTokenReused` if `patch` carries a purchase token another
    ///   payment already holds
    /// - `DatabaseError` on persistence failure
    async fn try_transition(
        &self,
        id: &PaymentId,
        to: PaymentStatus,
        patch: &CorrelationFields,
        at: Timestamp,
    ) -> Result<TransitionResult, DomainError>;

    /// Merge provider references into a payment that is still PENDING.
    ///
    /// Returns `false` when the payment is missing or already terminal.
    async fn patch_correlation(
        &self,
        id: &PaymentId,
        patch: &CorrelationFields,
    ) -> Result<bool, DomainError>;
}
