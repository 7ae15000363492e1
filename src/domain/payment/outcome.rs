//! Inbound signals and reconciliation outcomes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::subscription::SubscriptionWindow;

use super::{
    CorrelationFields, CorrelationKey, Payment, PaymentStatus, ProviderKind, RejectReason,
    ReportedAmount,
};

/// A provider report as it arrived on one channel, before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundSignal {
    /// VNPay IPN or browser return: the full query string.
    RedirectIpn { params: BTreeMap<String, String> },

    /// PayPal webhook: transmission headers (lower-case names) and the raw body.
    OAuthWebhook {
        headers: BTreeMap<String, String>,
        body: String,
    },

    /// PayPal client-initiated capture after the buyer approved the order.
    OAuthCapture { order_id: String },

    /// ZaloPay callback body `{ "data": ..., "mac": ..., "type": ... }`.
    HmacCallback { body: String },

    /// Google Play purchase token submitted by the app.
    InAppPurchase {
        payment_code: String,
        product_id: String,
        purchase_token: String,
    },
}

impl InboundSignal {
    /// The provider whose channel carries this signal.
    pub fn provider(&self) -> ProviderKind {
        match self {
            InboundSignal::RedirectIpn { .. } => ProviderKind::RedirectIpn,
            InboundSignal::OAuthWebhook { .. } | InboundSignal::OAuthCapture { .. } => {
                ProviderKind::OauthRest
            }
            InboundSignal::HmacCallback { .. } => ProviderKind::HmacCallback,
            InboundSignal::InAppPurchase { .. } => ProviderKind::Iap,
        }
    }

    /// Channel name for logs.
    pub fn channel(&self) -> &'static str {
        match self {
            InboundSignal::RedirectIpn { .. } => "redirect_ipn",
            InboundSignal::OAuthWebhook { .. } => "webhook",
            InboundSignal::OAuthCapture { .. } => "client_capture",
            InboundSignal::HmacCallback { .. } => "callback",
            InboundSignal::InAppPurchase { .. } => "purchase_token",
        }
    }
}

/// Terminal result a provider reported for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderOutcome {
    Success,
    Failed,
    Canceled,
}

impl ProviderOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            ProviderOutcome::Success => PaymentStatus::Success,
            ProviderOutcome::Failed => PaymentStatus::Failed,
            ProviderOutcome::Canceled => PaymentStatus::Canceled,
        }
    }
}

/// An authenticated provider report, ready for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedOutcome {
    pub correlation_key: CorrelationKey,
    pub outcome: ProviderOutcome,

    /// Amount the provider says was paid, when the channel reports one.
    pub reported_amount: Option<ReportedAmount>,

    /// Provider references to store with the transition.
    pub correlation_patch: CorrelationFields,
}

/// What happened to the package after a payment succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationReport {
    /// The transition was not into SUCCESS.
    NotRequired,

    /// The user's subscription now covers this window.
    Activated { window: SubscriptionWindow },

    /// Activation failed. The payment stays SUCCESS.
    Failed { reason: String },
}

/// Result of reconciling one inbound signal.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// This signal moved the payment out of PENDING.
    Applied {
        payment: Payment,
        activation: ActivationReport,
    },

    /// The payment was already terminal; carries its current status.
    NoOp(PaymentStatus),

    /// The signal was refused and nothing changed.
    Rejected(RejectReason),
}

impl ReconcileOutcome {
    /// Status of the payment after reconciliation, if one was located.
    pub fn status(&self) -> Option<PaymentStatus> {
        match self {
            ReconcileOutcome::Applied { payment, .. } => Some(payment.status),
            ReconcileOutcome::NoOp(status) => Some(*status),
            ReconcileOutcome::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ReconcileOutcome::Rejected(_))
    }
}
