//! Payment error types.
//!
//! Two families live here:
//!
//! - [`RejectReason`]: why an inbound signal was refused by reconciliation.
//!   Rejections never mutate a payment.
//! - [`PaymentError`]: failures of the commands the application exposes
//!   (checkout, lookups).
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | PackageNotFound | 404 |
//! | PaymentNotFound | 404 |
//! | ProviderNotConfigured | 400 |
//! | Provider (retryable) | 503 |
//! | Provider | 502 |
//! | Validation | 400 |
//! | Infrastructure | 500 |

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, PackageId, ValidationError};

use super::ProviderKind;

/// Why an inbound signal was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Signature or MAC did not verify, or the signal is bound to another payment.
    InvalidSignature,

    /// Signal could not be decoded, or arrived on the wrong provider's channel.
    MalformedSignal,

    /// Reported amount differs from the ledger amount.
    AmountMismatch,

    /// No payment carries the signal's correlation key.
    PaymentNotFound,

    /// Provider API failed or was unreachable.
    ProviderUnavailable,

    /// Verification did not finish within the configured bound.
    Timeout,

    /// Provider reports the payment as still in progress.
    NotSettled,
}

impl RejectReason {
    /// True when the provider should deliver the signal again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectReason::ProviderUnavailable | RejectReason::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::MalformedSignal => "malformed_signal",
            RejectReason::AmountMismatch => "amount_mismatch",
            RejectReason::PaymentNotFound => "payment_not_found",
            RejectReason::ProviderUnavailable => "provider_unavailable",
            RejectReason::Timeout => "timeout",
            RejectReason::NotSettled => "not_settled",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by payment commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Package not found: {0}")]
    PackageNotFound(PackageId),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Provider {0} is not configured")]
    ProviderNotConfigured(ProviderKind),

    #[error("Provider {provider} failed: {message}")]
    Provider {
        provider: ProviderKind,
        message: String,
        retryable: bool,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Error: {0}")]
    Infrastructure(String),
}

impl PaymentError {
    pub fn provider(provider: ProviderKind, message: impl Into<String>, retryable: bool) -> Self {
        PaymentError::Provider {
            provider,
            message: message.into(),
            retryable,
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        PaymentError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PaymentError::PackageNotFound(_) => ErrorCode::PackageNotFound,
            PaymentError::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            PaymentError::ProviderNotConfigured(_) | PaymentError::Validation(_) => {
                ErrorCode::ValidationFailed
            }
            PaymentError::Provider { .. } => ErrorCode::ExternalServiceError,
            PaymentError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns true if the caller may retry the same command.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Provider { retryable, .. } => *retryable,
            PaymentError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl From<DomainError> for PaymentError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => PaymentError::Validation(
                ValidationError::invalid_format("request", err.message),
            ),
            _ => PaymentError::Infrastructure(err.to_string()),
        }
    }
}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
