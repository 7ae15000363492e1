//! GetPaymentHandler - Query handler for payment status lookups.

use std::sync::Arc;

use crate::domain::payment::{Payment, PaymentCode, PaymentError};
use crate::ports::PaymentRepository;

/// Query for a payment by its code.
#[derive(Debug, Clone)]
pub struct GetPaymentQuery {
    pub code: PaymentCode,
}

pub struct GetPaymentHandler {
    repository: Arc<dyn PaymentRepository>,
}

impl GetPaymentHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, query: GetPaymentQuery) -> Result<Payment, PaymentError> {
        self.repository
            .find_by_code(&query.code)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(query.code.to_string()))
    }
}
