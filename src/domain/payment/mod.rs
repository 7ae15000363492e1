//! Payment domain module.
//!
//! The payment entity, its status machine, and the pure verification helpers
//! the provider adapters and the reconciliation engine share.
//!
//! # Module Structure
//!
//! - `aggregate` - Payment entity, payment code, correlation fields
//! - `status` - PaymentStatus state machine
//! - `provider` - ProviderKind
//! - `amount` - Reported amounts and cross-currency comparison
//! - `signature` - Canonical signing strings and HMAC helpers
//! - `outcome` - Inbound signals and reconciliation results
//! - `errors` - Rejection reasons and command errors

mod aggregate;
mod amount;
mod errors;
mod outcome;
mod provider;
pub mod signature;
mod status;

pub use aggregate::{CorrelationFields, CorrelationKey, Payment, PaymentCode};
pub use amount::{
    amounts_match, reported_amount_matches, Currency, ExchangeRate, ReportedAmount,
    AMOUNT_EPSILON, DEFAULT_VND_PER_USD,
};
pub use errors::{PaymentError, RejectReason};
pub use outcome::{
    ActivationReport, InboundSignal, ProviderOutcome, ReconcileOutcome, VerifiedOutcome,
};
pub use provider::ProviderKind;
pub use status::PaymentStatus;
