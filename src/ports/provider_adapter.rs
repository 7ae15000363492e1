//! Provider adapter port.
//!
//! One implementation per external payment gateway. Adapters build checkout
//! sessions and authenticate inbound signals; they never write to storage.
//!
//! # Design
//!
//! - **Stateless across adapters**: nothing is shared between providers
//! - **Storage-free**: provider references flow back as correlation patches
//!   and are written by the caller
//! - **Uniform failures**: every verification failure is a [`ProviderError`]
//!   that maps onto a single [`RejectReason`]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::payment::{
    CorrelationFields, InboundSignal, Payment, ProviderKind, RejectReason, VerifiedOutcome,
};

/// Port for a payment gateway integration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter speaks for.
    fn kind(&self) -> ProviderKind;

    /// Build the external checkout for a freshly created payment.
    ///
    /// Returns the reference the client follows (redirect URL, order URL, or
    /// the payment code for in-app purchases) plus the provider references to
    /// record before the payment is exposed.
    async fn create_checkout(
        &self,
        payment: &Payment,
        context: &CheckoutContext,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Authenticate an inbound signal and extract the outcome it reports.
    ///
    /// No side effects on the ledger. A signal for another provider is
    /// `MalformedSignal`.
    async fn verify_inbound(&self, signal: &InboundSignal) -> Result<VerifiedOutcome, ProviderError>;
}

/// Request-scoped data a checkout needs beyond the payment itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutContext {
    /// Display name of the package, used in order descriptions.
    pub package_name: String,

    /// Buyer's IP address (VNPay requires it).
    pub client_ip: String,

    /// Preferred UI language at the gateway, e.g. `vn` or `en`.
    pub locale: Option<String>,

    /// Pre-selected bank or wallet (VNPay `vnp_BankCode`).
    pub bank_code: Option<String>,

    /// Store product the package is sold as (Google Play).
    pub store_product_id: Option<String>,
}

/// Checkout created at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// What the client follows or hands to the provider SDK.
    pub external_reference: String,

    /// Provider references to store against the payment.
    pub correlation_patch: CorrelationFields,
}

/// Errors from provider adapter operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error code for categorization.
    pub code: ProviderErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's own error or status code, if available.
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidSignature, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::MalformedSignal, message)
    }

    pub fn not_settled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotSettled, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ProviderUnavailable, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, message)
    }

    /// The provider refused a request it understood (bad order data, unknown order).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Rejected, message)
    }

    /// Maps a `reqwest` failure onto timeout or unavailability.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("provider request timed out: {}", err))
        } else {
            Self::unavailable(format!("provider request failed: {}", err))
        }
    }

    /// The reconciliation rejection this error stands for.
    pub fn reject_reason(&self) -> RejectReason {
        match self.code {
            ProviderErrorCode::InvalidSignature => RejectReason::InvalidSignature,
            ProviderErrorCode::MalformedSignal | ProviderErrorCode::Rejected => {
                RejectReason::MalformedSignal
            }
            ProviderErrorCode::NotSettled => RejectReason::NotSettled,
            ProviderErrorCode::Timeout => RejectReason::Timeout,
            ProviderErrorCode::ProviderUnavailable | ProviderErrorCode::AuthenticationError => {
                RejectReason::ProviderUnavailable
            }
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    /// Signature, MAC or account binding did not verify.
    InvalidSignature,

    /// Signal could not be decoded.
    MalformedSignal,

    /// Payment still in progress at the provider.
    NotSettled,

    /// Provider refused the request.
    Rejected,

    /// API credentials were refused.
    AuthenticationError,

    /// Network failure or provider 5xx.
    ProviderUnavailable,

    /// Provider did not answer in time.
    Timeout,
}

impl ProviderErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::ProviderUnavailable | ProviderErrorCode::Timeout
        )
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::InvalidSignature => "invalid_signature",
            ProviderErrorCode::MalformedSignal => "malformed_signal",
            ProviderErrorCode::NotSettled => "not_settled",
            ProviderErrorCode::Rejected => "rejected",
            ProviderErrorCode::AuthenticationError => "authentication_error",
            ProviderErrorCode::ProviderUnavailable => "provider_unavailable",
            ProviderErrorCode::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}
