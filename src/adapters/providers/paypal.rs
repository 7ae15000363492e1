//! PayPal adapter (OAUTH_REST).
//!
//! Orders are created through the Orders v2 API with a client-credentials
//! token. Inbound webhooks are authenticated by PayPal's own
//! `verify-webhook-signature` endpoint; after that the payload is trusted only
//! for the order id, and the order's state is re-read from the API. Approved
//! orders are captured here, keyed by the payment code so repeated captures
//! are idempotent at PayPal.
//!
//! # Token cache
//!
//! One cached access token per adapter instance, refreshed
//! [`TOKEN_REFRESH_MARGIN`] before PayPal's stated expiry. No lock is held
//! while talking to PayPal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::domain::payment::{
    CorrelationFields, CorrelationKey, ExchangeRate, InboundSignal, Payment, ProviderKind,
    ProviderOutcome, ReportedAmount, VerifiedOutcome,
};
use crate::ports::{CheckoutContext, CheckoutSession, ProviderAdapter, ProviderError};

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TRANSMISSION_HEADERS: [&str; 5] = [
    "paypal-auth-algo",
    "paypal-cert-url",
    "paypal-transmission-id",
    "paypal-transmission-sig",
    "paypal-transmission-time",
];

/// PayPal REST configuration.
#[derive(Clone)]
pub struct PaypalConfig {
    client_id: String,
    client_secret: SecretString,

    /// Webhook id PayPal assigned to our listener; part of signature verification.
    webhook_id: String,

    /// `https://api-m.sandbox.paypal.com` or `https://api-m.paypal.com`.
    api_base_url: String,

    return_url: String,
    cancel_url: String,
    exchange_rate: ExchangeRate,
    request_timeout: Duration,
}

impl PaypalConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        webhook_id: impl Into<String>,
        return_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            webhook_id: webhook_id.into(),
            api_base_url: "https://api-m.sandbox.paypal.com".to_string(),
            return_url: return_url.into(),
            cancel_url: cancel_url.into(),
            exchange_rate: ExchangeRate::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set a custom API base URL (live environment or tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_exchange_rate(mut self, rate: ExchangeRate) -> Self {
        self.exchange_rate = rate;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Cached access token with expiry tracking.
struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(token: String, expires_in: Duration, now: Instant) -> Self {
        Self {
            token: SecretString::new(token),
            refresh_at: now + expires_in.saturating_sub(TOKEN_REFRESH_MARGIN),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    status: String,
    #[serde(default)]
    amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct VerifyWebhookResponse {
    verification_status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event_type: String,
    #[serde(default)]
    resource: serde_json::Value,
}

/// What an order lookup means for the payment.
#[derive(Debug, PartialEq)]
enum OrderDecision {
    /// Buyer approved; funds move only after we capture.
    Capture,

    Settled {
        outcome: ProviderOutcome,
        amount: Option<ReportedAmount>,
        capture_id: Option<String>,
    },
}

/// PayPal adapter.
pub struct PaypalAdapter {
    config: PaypalConfig,
    http_client: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl PaypalAdapter {
    pub fn new(config: PaypalConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Returns a valid access token, fetching a new one when the cache is stale.
    async fn access_token(&self) -> Result<SecretString, ProviderError> {
        if let Some(cached) = self.token_cache.read().await.as_ref() {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.token.clone());
            }
        }

        let response = self
            .http_client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(ProviderError::from_http)?;
        let token: TokenResponse = read_json(response, "oauth2 token").await?;

        let cached = CachedToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
            Instant::now(),
        );
        let secret = cached.token.clone();
        *self.token_cache.write().await = Some(cached);

        tracing::debug!(expires_in = token.expires_in, "PayPal access token refreshed");
        Ok(secret)
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.url(&format!("/v2/checkout/orders/{}", order_id)))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(ProviderError::from_http)?;
        read_json(response, "order lookup").await
    }

    /// Captures an approved order. `Ok(None)` when PayPal says it cannot be
    /// captured (already captured, or the buyer's funding failed).
    async fn capture_order(&self, order_id: &str, request_id: &str) -> Result<Option<Order>, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", order_id)))
            .bearer_auth(token.expose_secret())
            .header("PayPal-Request-Id", request_id)
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            tracing::info!(order_id, body = %body, "PayPal refused capture, re-reading order");
            return Ok(None);
        }
        read_json(response, "order capture").await.map(Some)
    }

    /// Re-reads the order, captures it if approved, and reports the result.
    async fn confirm_order(&self, order_id: &str) -> Result<VerifiedOutcome, ProviderError> {
        let mut order = self.get_order(order_id).await?;

        if interpret_order(&order)? == OrderDecision::Capture {
            let request_id = order
                .purchase_units
                .first()
                .and_then(|unit| unit.custom_id.clone())
                .unwrap_or_else(|| order.id.clone());
            order = match self.capture_order(order_id, &request_id).await? {
                Some(captured) => captured,
                None => self.get_order(order_id).await?,
            };
        }

        match interpret_order(&order)? {
            OrderDecision::Capture => Err(ProviderError::not_settled(format!(
                "order {} is approved but not captured",
                order.id
            ))),
            OrderDecision::Settled {
                outcome,
                amount,
                capture_id,
            } => Ok(VerifiedOutcome {
                correlation_key: CorrelationKey::OrderId(order.id.clone()),
                outcome,
                reported_amount: amount,
                correlation_patch: CorrelationFields {
                    order_id: Some(order.id),
                    capture_id,
                    ..Default::default()
                },
            }),
        }
    }

    async fn verify_webhook(
        &self,
        headers: &BTreeMap<String, String>,
        body: &str,
    ) -> Result<String, ProviderError> {
        let event: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ProviderError::malformed(format!("webhook body is not JSON: {}", e)))?;

        let mut transmission = BTreeMap::new();
        for name in TRANSMISSION_HEADERS {
            let value = headers
                .get(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ProviderError::invalid_signature(format!("missing {} header", name)))?;
            transmission.insert(name, value.as_str());
        }

        let request = serde_json::json!({
            "auth_algo": transmission["paypal-auth-algo"],
            "cert_url": transmission["paypal-cert-url"],
            "transmission_id": transmission["paypal-transmission-id"],
            "transmission_sig": transmission["paypal-transmission-sig"],
            "transmission_time": transmission["paypal-transmission-time"],
            "webhook_id": self.config.webhook_id,
            "webhook_event": event,
        });

        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(self.url("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_http)?;
        let verification: VerifyWebhookResponse = read_json(response, "webhook verification").await?;

        if verification.verification_status != "SUCCESS" {
            tracing::warn!(
                transmission_id = transmission["paypal-transmission-id"],
                status = %verification.verification_status,
                "PayPal webhook signature rejected"
            );
            return Err(ProviderError::invalid_signature("webhook signature not verified")
                .with_provider_code(verification.verification_status));
        }

        let envelope: WebhookEnvelope = serde_json::from_value(request["webhook_event"].clone())
            .map_err(|e| ProviderError::malformed(format!("webhook envelope: {}", e)))?;
        order_id_from_event(&envelope)
    }
}

#[async_trait]
impl ProviderAdapter for PaypalAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OauthRest
    }

    async fn create_checkout(
        &self,
        payment: &Payment,
        context: &CheckoutContext,
    ) -> Result<CheckoutSession, ProviderError> {
        let token = self.access_token().await?;
        let body = order_request(payment, context, &self.config);

        let response = self
            .http_client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token.expose_secret())
            .header("PayPal-Request-Id", format!("{}-create", payment.code))
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_http)?;
        let order: Order = read_json(response, "order creation").await?;

        let approve_url = order
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone())
            .ok_or_else(|| ProviderError::rejected("order has no approval link"))?;

        tracing::info!(
            payment_code = %payment.code,
            order_id = %order.id,
            "PayPal order created"
        );

        Ok(CheckoutSession {
            external_reference: approve_url,
            correlation_patch: CorrelationFields {
                order_id: Some(order.id),
                ..Default::default()
            },
        })
    }

    async fn verify_inbound(&self, signal: &InboundSignal) -> Result<VerifiedOutcome, ProviderError> {
        match signal {
            InboundSignal::OAuthWebhook { headers, body } => {
                let order_id = self.verify_webhook(headers, body).await?;
                self.confirm_order(&order_id).await
            }
            InboundSignal::OAuthCapture { order_id } => {
                if order_id.trim().is_empty() {
                    return Err(ProviderError::malformed("order id is empty"));
                }
                self.confirm_order(order_id).await
            }
            other => Err(ProviderError::malformed(format!(
                "PayPal cannot verify a {} signal",
                other.channel()
            ))),
        }
    }
}

fn order_request(payment: &Payment, context: &CheckoutContext, config: &PaypalConfig) -> serde_json::Value {
    let usd = config.exchange_rate.vnd_to_usd(payment.amount);
    serde_json::json!({
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": payment.code.as_str(),
            "custom_id": payment.code.as_str(),
            "description": format!("{} ({})", context.package_name, payment.code),
            "amount": {
                "currency_code": "USD",
                "value": format!("{:.2}", usd),
            },
        }],
        "application_context": {
            "return_url": config.return_url,
            "cancel_url": config.cancel_url,
            "user_action": "PAY_NOW",
            "shipping_preference": "NO_SHIPPING",
        },
    })
}

fn interpret_order(order: &Order) -> Result<OrderDecision, ProviderError> {
    match order.status.as_str() {
        "APPROVED" => Ok(OrderDecision::Capture),
        "COMPLETED" => {
            let capture = order
                .purchase_units
                .iter()
                .filter_map(|unit| unit.payments.as_ref())
                .flat_map(|payments| payments.captures.iter())
                .next()
                .ok_or_else(|| ProviderError::not_settled("completed order has no capture"))?;
            interpret_capture(capture)
        }
        "VOIDED" => Ok(OrderDecision::Settled {
            outcome: ProviderOutcome::Canceled,
            amount: None,
            capture_id: None,
        }),
        "DECLINED" => Ok(OrderDecision::Settled {
            outcome: ProviderOutcome::Failed,
            amount: None,
            capture_id: None,
        }),
        other => Err(ProviderError::not_settled(format!("order status {}", other))
            .with_provider_code(other)),
    }
}

fn interpret_capture(capture: &Capture) -> Result<OrderDecision, ProviderError> {
    let outcome = match capture.status.as_str() {
        "COMPLETED" => ProviderOutcome::Success,
        "DECLINED" | "FAILED" => ProviderOutcome::Failed,
        other => {
            return Err(ProviderError::not_settled(format!("capture status {}", other))
                .with_provider_code(other))
        }
    };

    let amount = match (&capture.amount, outcome) {
        (Some(money), _) => Some(parse_usd(money)?),
        (None, ProviderOutcome::Success) => {
            return Err(ProviderError::malformed("completed capture carries no amount"))
        }
        (None, _) => None,
    };

    Ok(OrderDecision::Settled {
        outcome,
        amount,
        capture_id: Some(capture.id.clone()),
    })
}

fn parse_usd(money: &Money) -> Result<ReportedAmount, ProviderError> {
    if money.currency_code != "USD" {
        return Err(ProviderError::malformed(format!(
            "unexpected capture currency {}",
            money.currency_code
        )));
    }
    let value: f64 = money
        .value
        .parse()
        .map_err(|_| ProviderError::malformed(format!("bad amount '{}'", money.value)))?;
    Ok(ReportedAmount::usd(value))
}

/// Order id a verified webhook refers to.
fn order_id_from_event(event: &WebhookEnvelope) -> Result<String, ProviderError> {
    let order_id = if event.event_type.starts_with("CHECKOUT.ORDER.") {
        event.resource.get("id")
    } else if event.event_type.starts_with("PAYMENT.CAPTURE.") {
        event
            .resource
            .pointer("/supplementary_data/related_ids/order_id")
    } else {
        return Err(ProviderError::malformed(format!(
            "unsupported webhook event {}",
            event.event_type
        )));
    };

    order_id
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::malformed("webhook does not name an order"))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::malformed(format!("PayPal {} response: {}", what, e)));
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "PayPal {} failed", what);
    let message = format!("PayPal {} returned {}", what, status);
    let err = match status.as_u16() {
        401 | 403 => ProviderError::authentication(message),
        429 | 500..=599 => ProviderError::unavailable(message),
        _ => ProviderError::rejected(message),
    };
    Err(err.with_provider_code(status.as_str()))
}
