//! Google Play adapter (IAP).
//!
//! The app starts the billing flow with the payment code as its obfuscated
//! account id, then submits the purchase token. The token is checked with
//! the store through a [`PurchaseValidator`]; the store's record must be bound
//! to the same payment code. The product and token travel back in the
//! correlation patch so the ledger can hold the payment to its package's
//! product and to one token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::payment::{
    CorrelationFields, CorrelationKey, InboundSignal, Payment, PaymentCode, ProviderKind,
    ProviderOutcome, VerifiedOutcome,
};
use crate::ports::{
    CheckoutContext, CheckoutSession, ProductPurchase, ProviderAdapter, ProviderError,
    PurchaseState, PurchaseValidator,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Google Play Developer API configuration.
#[derive(Clone)]
pub struct GooglePlayConfig {
    /// Android application id, e.g. `com.example.quiz`.
    package_name: String,

    /// OAuth2 bearer token for the Android Publisher API.
    access_token: SecretString,

    api_base_url: String,
    request_timeout: Duration,
}

impl GooglePlayConfig {
    pub fn new(package_name: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            access_token: SecretString::new(access_token.into()),
            api_base_url: "https://androidpublisher.googleapis.com".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Google Play adapter.
pub struct GooglePlayAdapter {
    validator: Arc<dyn PurchaseValidator>,
}

impl GooglePlayAdapter {
    pub fn new(validator: Arc<dyn PurchaseValidator>) -> Self {
        Self { validator }
    }

    async fn verify_purchase(
        &self,
        payment_code: &str,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<VerifiedOutcome, ProviderError> {
        let code = PaymentCode::parse(payment_code)
            .map_err(|e| ProviderError::malformed(format!("payment code: {}", e)))?;
        if product_id.trim().is_empty() || purchase_token.trim().is_empty() {
            return Err(ProviderError::malformed("product id and purchase token are required"));
        }

        let purchase = self.validator.validate(product_id, purchase_token).await?;
        check_account_binding(&purchase, &code)?;

        let outcome = match purchase.purchase_state {
            PurchaseState::Purchased => ProviderOutcome::Success,
            PurchaseState::Canceled => ProviderOutcome::Canceled,
            PurchaseState::Pending => {
                return Err(ProviderError::not_settled("purchase is pending at Google Play"))
            }
        };

        Ok(VerifiedOutcome {
            correlation_key: CorrelationKey::PaymentCode(code),
            outcome,
            reported_amount: None,
            correlation_patch: CorrelationFields {
                order_id: purchase.order_id,
                purchase_token: Some(purchase_token.to_string()),
                product_id: Some(product_id.to_string()),
                ..Default::default()
            },
        })
    }
}

/// The store record must be bound to exactly this payment.
fn check_account_binding(purchase: &ProductPurchase, code: &PaymentCode) -> Result<(), ProviderError> {
    match purchase.obfuscated_account_id.as_deref() {
        Some(bound) if bound == code.as_str() => Ok(()),
        Some(bound) => {
            tracing::warn!(
                payment_code = %code,
                bound_to = bound,
                "Purchase token bound to another payment"
            );
            Err(ProviderError::invalid_signature(
                "purchase is bound to a different payment code",
            ))
        }
        None => {
            tracing::warn!(payment_code = %code, "Purchase token carries no account binding");
            Err(ProviderError::invalid_signature(
                "purchase is not bound to a payment code",
            ))
        }
    }
}

#[async_trait]
impl ProviderAdapter for GooglePlayAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Iap
    }

    async fn create_checkout(
        &self,
        payment: &Payment,
        context: &CheckoutContext,
    ) -> Result<CheckoutSession, ProviderError> {
        let product_id = context.store_product_id.clone().ok_or_else(|| {
            ProviderError::rejected(format!(
                "package {} is not sold through Google Play",
                payment.package_id
            ))
        })?;
        Ok(CheckoutSession {
            external_reference: payment.code.to_string(),
            correlation_patch: CorrelationFields {
                product_id: Some(product_id),
                ..Default::default()
            },
        })
    }

    async fn verify_inbound(&self, signal: &InboundSignal) -> Result<VerifiedOutcome, ProviderError> {
        match signal {
            InboundSignal::InAppPurchase {
                payment_code,
                product_id,
                purchase_token,
            } => {
                self.verify_purchase(payment_code, product_id, purchase_token)
                    .await
            }
            other => Err(ProviderError::malformed(format!(
                "Google Play cannot verify a {} signal",
                other.channel()
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductPurchaseResource {
    purchase_state: Option<i64>,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    obfuscated_external_account_id: Option<String>,
}

/// `PurchaseValidator` backed by the Android Publisher
/// `purchases.products.get` endpoint.
pub struct HttpPurchaseValidator {
    config: GooglePlayConfig,
    http_client: reqwest::Client,
}

impl HttpPurchaseValidator {
    pub fn new(config: GooglePlayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http_client }
    }

    fn purchase_url(&self, product_id: &str, purchase_token: &str) -> Result<url::Url, ProviderError> {
        let mut url = url::Url::parse(&self.config.api_base_url)
            .map_err(|e| ProviderError::unavailable(format!("bad Google Play base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::unavailable("Google Play base URL cannot hold a path"))?
            .pop_if_empty()
            .extend([
                "androidpublisher",
                "v3",
                "applications",
                self.config.package_name.as_str(),
                "purchases",
                "products",
                product_id,
                "tokens",
                purchase_token,
            ]);
        Ok(url)
    }
}

#[async_trait]
impl PurchaseValidator for HttpPurchaseValidator {
    async fn validate(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<ProductPurchase, ProviderError> {
        let url = self.purchase_url(product_id, purchase_token)?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, product_id, "Google Play validation failed");
            let message = format!("Google Play returned {}", status);
            let err = match status.as_u16() {
                400 | 404 | 410 => ProviderError::invalid_signature(message),
                401 | 403 => ProviderError::authentication(message),
                429 | 500..=599 => ProviderError::unavailable(message),
                _ => ProviderError::rejected(message),
            };
            return Err(err.with_provider_code(status.as_str()));
        }

        let resource: ProductPurchaseResource = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("Google Play response: {}", e)))?;
        parse_purchase(resource)
    }
}

fn parse_purchase(resource: ProductPurchaseResource) -> Result<ProductPurchase, ProviderError> {
    let code = resource
        .purchase_state
        .ok_or_else(|| ProviderError::malformed("Google Play response has no purchaseState"))?;
    let purchase_state = PurchaseState::from_code(code).ok_or_else(|| {
        ProviderError::malformed(format!("unknown purchaseState {}", code))
    })?;
    Ok(ProductPurchase {
        purchase_state,
        order_id: resource.order_id,
        obfuscated_account_id: resource.obfuscated_external_account_id,
    })
}
