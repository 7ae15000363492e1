//! Request and response DTOs for payment endpoints.
//!
//! Provider acknowledgements use each gateway's own wire shape; everything
//! else uses camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::payment::{
    ActivationReport, Payment, PaymentError, PaymentStatus, ProviderKind, ReconcileOutcome,
    RejectReason,
};

// ════════════════════════════════════════════════════════════════════════════════
// Client Requests
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /payments/checkout`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub package_id: String,

    /// Provider kind (`REDIRECT_IPN`) or gateway alias (`vnpay`).
    pub provider: String,

    #[serde(default)]
    pub locale: Option<String>,

    /// VNPay bank preselection.
    #[serde(default)]
    pub bank_code: Option<String>,
}

/// Body of `POST /payments/paypal/capture`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderRequest {
    pub order_id: String,
}

/// Body of `POST /payments/google/verify`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPurchaseRequest {
    pub payment_code: String,
    pub product_id: String,
    pub purchase_token: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Client Responses
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub payment_code: String,

    /// Redirect URL, order id or token, depending on the provider.
    pub external_reference: String,

    pub provider: ProviderKind,
    pub amount: i64,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub payment_code: String,
    pub package_id: String,
    pub provider: ProviderKind,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            payment_code: payment.code.to_string(),
            package_id: payment.package_id.to_string(),
            provider: payment.provider,
            amount: payment.amount,
            status: payment.status,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// Result of a client-submitted signal (PayPal capture, Google Play token).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    /// `applied`, `no_op` or `rejected`.
    pub outcome: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationReport>,
}

impl From<ReconcileOutcome> for ReconcileResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Applied {
                payment,
                activation,
            } => Self {
                outcome: "applied",
                status: Some(payment.status),
                payment_code: Some(payment.code.to_string()),
                reason: None,
                activation: Some(activation),
            },
            ReconcileOutcome::NoOp(status) => Self {
                outcome: "no_op",
                status: Some(status),
                payment_code: None,
                reason: None,
                activation: None,
            },
            ReconcileOutcome::Rejected(reason) => Self {
                outcome: "rejected",
                status: None,
                payment_code: None,
                reason: Some(reason),
                activation: None,
            },
        }
    }
}

/// Body of `GET /payments/vnpay/return`, read by the result page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VnpayReturnResponse {
    /// Payment status, or `REJECTED` when the redirect did not verify.
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl VnpayReturnResponse {
    pub fn new(outcome: &ReconcileOutcome, payment_code: Option<String>) -> Self {
        match outcome {
            ReconcileOutcome::Rejected(reason) => Self {
                status: "REJECTED".to_string(),
                payment_code,
                reason: Some(*reason),
            },
            settled => Self {
                status: settled
                    .status()
                    .map(|s| s.as_str().to_uppercase())
                    .unwrap_or_default(),
                payment_code,
                reason: None,
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Provider Acknowledgements
// ════════════════════════════════════════════════════════════════════════════════

/// VNPay IPN acknowledgement. Any code other than `00` and `02` makes VNPay retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VnpayIpnAck {
    #[serde(rename = "RspCode")]
    pub rsp_code: &'static str,

    #[serde(rename = "Message")]
    pub message: &'static str,
}

impl VnpayIpnAck {
    pub fn from_result(result: &Result<ReconcileOutcome, PaymentError>) -> Self {
        let (rsp_code, message) = match result {
            Ok(ReconcileOutcome::Applied { .. }) => ("00", "Confirm Success"),
            Ok(ReconcileOutcome::NoOp(_)) => ("02", "Order already confirmed"),
            Ok(ReconcileOutcome::Rejected(reason)) => match reason {
                RejectReason::InvalidSignature => ("97", "Invalid signature"),
                RejectReason::AmountMismatch => ("04", "Invalid amount"),
                RejectReason::PaymentNotFound => ("01", "Order not found"),
                _ => ("99", "Unknown error"),
            },
            Err(_) => ("99", "Unknown error"),
        };
        Self { rsp_code, message }
    }
}

/// ZaloPay callback acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZalopayCallbackAck {
    /// `1` accepted, `2` already processed, `-1` rejected, `0` retry.
    pub return_code: i32,
    pub return_message: String,
}

impl ZalopayCallbackAck {
    pub fn from_result(result: &Result<ReconcileOutcome, PaymentError>) -> Self {
        let (return_code, return_message) = match result {
            Ok(ReconcileOutcome::Applied { .. }) => (1, "success".to_string()),
            Ok(ReconcileOutcome::NoOp(_)) => (2, "already processed".to_string()),
            Ok(ReconcileOutcome::Rejected(reason)) if reason.is_retryable() => {
                (0, reason.as_str().to_string())
            }
            Ok(ReconcileOutcome::Rejected(reason)) => (-1, reason.as_str().to_string()),
            Err(e) if e.is_retryable() => (0, e.to_string()),
            Err(e) => (-1, e.to_string()),
        };
        Self {
            return_code,
            return_message,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Error response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
