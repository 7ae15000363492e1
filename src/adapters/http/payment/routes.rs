//! Axum router configuration for payment endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_checkout, get_payment, google_verify, paypal_capture, paypal_webhook, vnpay_ipn,
    vnpay_return, zalopay_callback, PaymentAppState,
};

/// Create the payment API router.
///
/// # Routes
///
/// ## Client Endpoints
/// - `POST /checkout` - Create a payment and its checkout (`X-User-Id` required)
/// - `GET /:code` - Payment status
/// - `POST /paypal/capture` - Capture an approved PayPal order
/// - `POST /google/verify` - Submit a Google Play purchase token
///
/// ## Provider Callbacks (no auth, verified by signature)
/// - `GET /vnpay/ipn`
/// - `GET /vnpay/return`
/// - `POST /paypal/webhook`
/// - `POST /zalopay/callback`
pub fn payment_routes() -> Router<PaymentAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/paypal/capture", post(paypal_capture))
        .route("/google/verify", post(google_verify))
        .route("/vnpay/ipn", get(vnpay_ipn))
        .route("/vnpay/return", get(vnpay_return))
        .route("/paypal/webhook", post(paypal_webhook))
        .route("/zalopay/callback", post(zalopay_callback))
        .route("/:code", get(get_payment))
}

/// Payment routes mounted under `/payments`.
pub fn payment_router() -> Router<PaymentAppState> {
    Router::new().nest("/payments", payment_routes())
}
