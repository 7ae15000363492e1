//! HTTP handlers for payment endpoints.
//!
//! Thin wrappers: decode the request into a command or an `InboundSignal`,
//! call the application layer, and encode the answer in the shape the caller
//! (client app or provider) expects.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::payment::{
    CreateCheckoutCommand, CreateCheckoutHandler, GetPaymentHandler, GetPaymentQuery,
    ReconciliationEngine,
};
use crate::domain::foundation::{PackageId, UserId};
use crate::domain::payment::{
    InboundSignal, PaymentCode, PaymentError, ProviderKind, ReconcileOutcome, RejectReason,
};

use super::dto::{
    CaptureOrderRequest, CheckoutResponse, CreateCheckoutRequest, ErrorResponse, PaymentResponse,
    ReconcileResponse, VerifyPurchaseRequest, VnpayIpnAck, VnpayReturnResponse,
    ZalopayCallbackAck,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for payment endpoints. Cloned per request.
#[derive(Clone)]
pub struct PaymentAppState {
    pub checkout: Arc<CreateCheckoutHandler>,
    pub engine: Arc<ReconciliationEngine>,
    pub payments: Arc<GetPaymentHandler>,
}

impl PaymentAppState {
    pub fn new(
        checkout: CreateCheckoutHandler,
        engine: ReconciliationEngine,
        payments: GetPaymentHandler,
    ) -> Self {
        Self {
            checkout: Arc::new(checkout),
            engine: Arc::new(engine),
            payments: Arc::new(payments),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Request Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity supplied by the upstream gateway in `X-User-Id`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// First address in `X-Forwarded-For`, else loopback. VNPay requires a client IP.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

// ════════════════════════════════════════════════════════════════════════════════
// Client Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /payments/checkout - Create a payment and its provider checkout
pub async fn create_checkout(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let cmd = CreateCheckoutCommand {
        user_id: user.user_id,
        package_id: PackageId::new(request.package_id)?,
        provider: ProviderKind::from_str(&request.provider)?,
        client_ip: client_ip(&headers),
        locale: request.locale,
        bank_code: request.bank_code,
    };

    let result = state.checkout.handle(cmd).await?;

    let response = CheckoutResponse {
        payment_code: result.payment_code.to_string(),
        external_reference: result.external_reference,
        provider: result.payment.provider,
        amount: result.payment.amount,
        status: result.payment.status,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /payments/:code - Payment status lookup
pub async fn get_payment(
    State(state): State<PaymentAppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let code = PaymentCode::parse(code)?;
    let payment = state.payments.handle(GetPaymentQuery { code }).await?;
    Ok(Json(PaymentResponse::from(payment)))
}

/// POST /payments/paypal/capture - Buyer approved the order in the PayPal popup
pub async fn paypal_capture(
    State(state): State<PaymentAppState>,
    Json(request): Json<CaptureOrderRequest>,
) -> Result<Response, PaymentApiError> {
    let signal = InboundSignal::OAuthCapture {
        order_id: request.order_id,
    };
    let outcome = state.engine.reconcile(ProviderKind::OauthRest, signal).await?;
    Ok(client_reconcile_response(outcome))
}

/// POST /payments/google/verify - App submits a Google Play purchase token
pub async fn google_verify(
    State(state): State<PaymentAppState>,
    Json(request): Json<VerifyPurchaseRequest>,
) -> Result<Response, PaymentApiError> {
    let signal = InboundSignal::InAppPurchase {
        payment_code: request.payment_code,
        product_id: request.product_id,
        purchase_token: request.purchase_token,
    };
    let outcome = state.engine.reconcile(ProviderKind::Iap, signal).await?;
    Ok(client_reconcile_response(outcome))
}

fn client_reconcile_response(outcome: ReconcileOutcome) -> Response {
    let status = match &outcome {
        ReconcileOutcome::Applied { .. } | ReconcileOutcome::NoOp(_) => StatusCode::OK,
        ReconcileOutcome::Rejected(reason) => match reason {
            RejectReason::PaymentNotFound => StatusCode::NOT_FOUND,
            RejectReason::InvalidSignature => StatusCode::UNAUTHORIZED,
            RejectReason::NotSettled => StatusCode::ACCEPTED,
            RejectReason::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RejectReason::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RejectReason::AmountMismatch | RejectReason::MalformedSignal => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        },
    };
    (status, Json(ReconcileResponse::from(outcome))).into_response()
}

// ════════════════════════════════════════════════════════════════════════════════
// Provider Callbacks (no auth, verified by the adapters)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /payments/vnpay/ipn - Server-to-server notification from VNPay
///
/// Always answers 200; the outcome travels in `RspCode`.
pub async fn vnpay_ipn(
    State(state): State<PaymentAppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> impl IntoResponse {
    let result = state
        .engine
        .reconcile(ProviderKind::RedirectIpn, InboundSignal::RedirectIpn { params })
        .await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "VNPay IPN could not be processed");
    }
    Json(VnpayIpnAck::from_result(&result))
}

/// GET /payments/vnpay/return - Buyer's browser coming back from VNPay
pub async fn vnpay_return(
    State(state): State<PaymentAppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let payment_code = params.get("vnp_TxnRef").cloned();
    let outcome = state
        .engine
        .reconcile(ProviderKind::RedirectIpn, InboundSignal::RedirectIpn { params })
        .await?;
    Ok(Json(VnpayReturnResponse::new(&outcome, payment_code)))
}

/// POST /payments/paypal/webhook - PayPal event notification
///
/// 2xx tells PayPal to stop redelivering; 503 asks it to try again.
pub async fn paypal_webhook(
    State(state): State<PaymentAppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, PaymentApiError> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let outcome = state
        .engine
        .reconcile(ProviderKind::OauthRest, InboundSignal::OAuthWebhook { headers, body })
        .await?;

    let status = match &outcome {
        ReconcileOutcome::Rejected(reason) if reason.is_retryable() => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::OK,
    };
    Ok((status, Json(ReconcileResponse::from(outcome))).into_response())
}

/// POST /payments/zalopay/callback - ZaloPay payment callback
///
/// Always answers 200; the outcome travels in `return_code`.
pub async fn zalopay_callback(
    State(state): State<PaymentAppState>,
    body: String,
) -> impl IntoResponse {
    let result = state
        .engine
        .reconcile(ProviderKind::HmacCallback, InboundSignal::HmacCallback { body })
        .await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "ZaloPay callback could not be processed");
    }
    Json(ZalopayCallbackAck::from_result(&result))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts payment errors to HTTP responses.
#[derive(Debug)]
pub struct PaymentApiError(PaymentError);

impl<E> From<E> for PaymentApiError
where
    E: Into<PaymentError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PaymentError::PackageNotFound(_) | PaymentError::PaymentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PaymentError::ProviderNotConfigured(_) | PaymentError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            PaymentError::Provider { retryable: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Provider { .. } => StatusCode::BAD_GATEWAY,
            PaymentError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self.0 {
            PaymentError::Infrastructure(detail) => {
                tracing::error!(error = %detail, "Payment request failed");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse::new(self.0.code().to_string(), message);
        (status, Json(body)).into_response()
    }
}
