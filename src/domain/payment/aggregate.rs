//! Payment entity.
//!
//! # Invariants
//!
//! - `code` is derived from `id` and never changes
//! - `amount` is positive and expressed in whole VND
//! - `status` leaves `Pending` at most once

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    PackageId, PaymentId, StateMachine, Timestamp, UserId, ValidationError,
};

use super::{PaymentStatus, ProviderKind};

const CODE_PREFIX: &str = "PAY";

/// Provider-facing business key of a payment.
///
/// Generated from the payment id before the record is inserted, so the value a
/// provider sees is final from the first write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentCode(String);

impl PaymentCode {
    /// Derives the code for a payment id: `PAY` followed by the 32 hex digits of the UUID.
    pub fn from_id(id: &PaymentId) -> Self {
        Self(format!(
            "{}{}",
            CODE_PREFIX,
            id.as_uuid().simple().to_string().to_uppercase()
        ))
    }

    /// Parses a code received from a provider or client.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let valid = raw.len() == CODE_PREFIX.len() + 32
            && raw.starts_with(CODE_PREFIX)
            && raw[CODE_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_digit() || (c.is_ascii_uppercase() && c.is_ascii_hexdigit()));
        if !valid {
            return Err(ValidationError::invalid_format(
                "payment_code",
                format!("'{}' is not a payment code", raw),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider references recorded against a payment.
///
/// Opaque to the reconciliation engine; used only to find the payment a
/// signal refers to and kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationFields {
    /// Gateway transaction number (VNPay `vnp_TransactionNo`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_no: Option<String>,

    /// Gateway response code (VNPay `vnp_ResponseCode`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,

    /// Provider order id (PayPal order, Google Play order).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// PayPal capture id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,

    /// ZaloPay `app_trans_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_trans_id: Option<String>,

    /// ZaloPay `zp_trans_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_trans_id: Option<String>,

    /// Google Play purchase token. At most one payment may hold a given token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_token: Option<String>,

    /// Store product id the payment is for (Google Play), recorded at checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl CorrelationFields {
    pub fn is_empty(&self) -> bool {
        *self == CorrelationFields::default()
    }

    /// Overwrites every field that is set in `patch`, leaving the rest untouched.
    pub fn merge(&mut self, patch: &CorrelationFields) {
        fn take(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.transaction_no, &patch.transaction_no);
        take(&mut self.response_code, &patch.response_code);
        take(&mut self.bank_code, &patch.bank_code);
        take(&mut self.order_id, &patch.order_id);
        take(&mut self.capture_id, &patch.capture_id);
        take(&mut self.app_trans_id, &patch.app_trans_id);
        take(&mut self.provider_trans_id, &patch.provider_trans_id);
        take(&mut self.purchase_token, &patch.purchase_token);
        take(&mut self.product_id, &patch.product_id);
    }
}

/// How an inbound signal identifies its payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationKey {
    /// Our own payment code, echoed back by the provider (VNPay `vnp_TxnRef`, IAP account id).
    PaymentCode(PaymentCode),

    /// Provider order id stored at checkout (PayPal).
    OrderId(String),

    /// ZaloPay `app_trans_id` stored at checkout.
    AppTransId(String),
}

impl CorrelationKey {
    /// Name of the correlation field holding this key, `None` for the payment code column.
    pub fn field_name(&self) -> Option<&'static str> {
        match self {
            CorrelationKey::PaymentCode(_) => None,
            CorrelationKey::OrderId(_) => Some("order_id"),
            CorrelationKey::AppTransId(_) => Some("app_trans_id"),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            CorrelationKey::PaymentCode(code) => code.as_str(),
            CorrelationKey::OrderId(v) | CorrelationKey::AppTransId(v) => v,
        }
    }

    /// True when `payment` carries this key.
    pub fn matches(&self, payment: &Payment) -> bool {
        match self {
            CorrelationKey::PaymentCode(code) => &payment.code == code,
            CorrelationKey::OrderId(id) => {
                payment.correlation.order_id.as_deref() == Some(id.as_str())
            }
            CorrelationKey::AppTransId(id) => {
                payment.correlation.app_trans_id.as_deref() == Some(id.as_str())
            }
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field_name() {
            Some(field) => write!(f, "{}={}", field, self.value()),
            None => write!(f, "payment_code={}", self.value()),
        }
    }
}

/// A payment for one subscription package through one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub code: PaymentCode,
    pub user_id: UserId,
    pub package_id: PackageId,

    /// Whole VND. Adapters convert to their own units.
    pub amount: i64,

    pub provider: ProviderKind,
    pub status: PaymentStatus,
    pub correlation: CorrelationFields,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    /// Creates a new pending payment with its final code.
    ///
    /// # Errors
    ///
    /// Returns `NotPositive` when `amount` is zero or negative.
    pub fn new_pending(
        id: PaymentId,
        user_id: UserId,
        package_id: PackageId,
        provider: ProviderKind,
        amount: i64,
    ) -> Result<Self, ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::not_positive("amount", amount));
        }
        let now = Timestamp::now();
        Ok(Self {
            id,
            code: PaymentCode::from_id(&id),
            user_id,
            package_id,
            amount,
            provider,
            status: PaymentStatus::Pending,
            correlation: CorrelationFields::default(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves a pending payment to a terminal status, merging provider references.
    ///
    /// Storage adapters call this only inside their compare-and-set section.
    pub fn settle(
        &mut self,
        status: PaymentStatus,
        patch: &CorrelationFields,
        at: Timestamp,
    ) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(status)?;
        self.correlation.merge(patch);
        self.updated_at = at;
        Ok(())
    }
}
