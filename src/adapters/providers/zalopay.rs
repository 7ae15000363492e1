//! ZaloPay adapter (HMAC_CALLBACK).
//!
//! Orders are created with a MAC keyed by `key1`. ZaloPay then posts a
//! callback `{ data, mac, type }` for successful payments only, where `mac`
//! is HMAC-SHA256 of the raw `data` string keyed by `key2`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::Timestamp;
use crate::domain::payment::signature::{hmac_sha256_hex, signatures_equal};
use crate::domain::payment::{
    CorrelationFields, CorrelationKey, InboundSignal, Payment, ProviderKind, ProviderOutcome,
    ReportedAmount, VerifiedOutcome,
};
use crate::ports::{CheckoutContext, CheckoutSession, ProviderAdapter, ProviderError};

use super::vietnam_local;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// ZaloPay merchant configuration.
#[derive(Clone)]
pub struct ZalopayConfig {
    app_id: i64,
    key1: SecretString,
    key2: SecretString,

    /// Order creation endpoint, e.g. `https://sb-openapi.zalopay.vn/v2/create`.
    create_order_url: String,

    callback_url: String,
    redirect_url: String,
    request_timeout: Duration,
}

impl ZalopayConfig {
    pub fn new(
        app_id: i64,
        key1: impl Into<String>,
        key2: impl Into<String>,
        create_order_url: impl Into<String>,
        callback_url: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            key1: SecretString::new(key1.into()),
            key2: SecretString::new(key2.into()),
            create_order_url: create_order_url.into(),
            callback_url: callback_url.into(),
            redirect_url: redirect_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Order fields covered by the order MAC, in signing order.
#[derive(Debug, Clone, PartialEq)]
struct OrderFields {
    app_id: i64,
    app_trans_id: String,
    app_user: String,
    amount: i64,
    app_time: i64,
    embed_data: String,
    item: String,
}

impl OrderFields {
    fn signing_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.app_id,
            self.app_trans_id,
            self.app_user,
            self.amount,
            self.app_time,
            self.embed_data,
            self.item
        )
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    sub_return_code: Option<i64>,
    #[serde(default)]
    order_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    data: String,
    mac: String,
}

#[derive(Debug, Deserialize)]
struct CallbackData {
    app_id: i64,
    app_trans_id: String,
    amount: i64,
    zp_trans_id: i64,
}

/// ZaloPay adapter.
pub struct ZalopayAdapter {
    config: ZalopayConfig,
    http_client: reqwest::Client,
}

impl ZalopayAdapter {
    pub fn new(config: ZalopayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http_client }
    }

    fn order_fields(&self, payment: &Payment, now: Timestamp) -> OrderFields {
        let embed_data = serde_json::json!({
            "redirecturl": self.config.redirect_url,
            "payment_code": payment.code.as_str(),
        });
        OrderFields {
            app_id: self.config.app_id,
            app_trans_id: app_trans_id(payment, &now),
            app_user: payment.user_id.to_string(),
            amount: payment.amount,
            app_time: now.as_unix_millis(),
            embed_data: embed_data.to_string(),
            item: "[]".to_string(),
        }
    }

    fn order_mac(&self, fields: &OrderFields) -> String {
        hmac_sha256_hex(
            self.config.key1.expose_secret().as_bytes(),
            fields.signing_string().as_bytes(),
        )
    }

    fn verify_callback(&self, body: &str) -> Result<VerifiedOutcome, ProviderError> {
        let callback: CallbackBody = serde_json::from_str(body)
            .map_err(|e| ProviderError::malformed(format!("callback body: {}", e)))?;

        let expected = hmac_sha256_hex(
            self.config.key2.expose_secret().as_bytes(),
            callback.data.as_bytes(),
        );
        if !signatures_equal(&expected, &callback.mac) {
            tracing::warn!("ZaloPay callback MAC mismatch");
            return Err(ProviderError::invalid_signature("callback mac does not match"));
        }

        let data: CallbackData = serde_json::from_str(&callback.data)
            .map_err(|e| ProviderError::malformed(format!("callback data: {}", e)))?;
        if data.app_id != self.config.app_id {
            return Err(ProviderError::invalid_signature(format!(
                "callback for app {} received by app {}",
                data.app_id, self.config.app_id
            )));
        }

        Ok(VerifiedOutcome {
            correlation_key: CorrelationKey::AppTransId(data.app_trans_id.clone()),
            outcome: ProviderOutcome::Success,
            reported_amount: Some(ReportedAmount::vnd(data.amount as f64)),
            correlation_patch: CorrelationFields {
                app_trans_id: Some(data.app_trans_id),
                provider_trans_id: Some(data.zp_trans_id.to_string()),
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl ProviderAdapter for ZalopayAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HmacCallback
    }

    async fn create_checkout(
        &self,
        payment: &Payment,
        context: &CheckoutContext,
    ) -> Result<CheckoutSession, ProviderError> {
        let fields = self.order_fields(payment, Timestamp::now());
        let mac = self.order_mac(&fields);
        let description = format!("Thanh toan goi {} #{}", context.package_name, payment.code);

        let form = [
            ("app_id", fields.app_id.to_string()),
            ("app_trans_id", fields.app_trans_id.clone()),
            ("app_user", fields.app_user.clone()),
            ("amount", fields.amount.to_string()),
            ("app_time", fields.app_time.to_string()),
            ("embed_data", fields.embed_data.clone()),
            ("item", fields.item.clone()),
            ("description", description),
            ("bank_code", context.bank_code.clone().unwrap_or_default()),
            ("callback_url", self.config.callback_url.clone()),
            ("mac", mac),
        ];

        let response = self
            .http_client
            .post(&self.config.create_order_url)
            .form(&form)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "ZaloPay create order failed");
            return Err(ProviderError::unavailable(format!("ZaloPay returned {}", status))
                .with_provider_code(status.as_str()));
        }

        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unavailable(format!("ZaloPay response: {}", e)))?;

        if created.return_code != 1 {
            tracing::warn!(
                payment_code = %payment.code,
                return_code = created.return_code,
                sub_return_code = ?created.sub_return_code,
                message = %created.return_message,
                "ZaloPay refused order"
            );
            return Err(ProviderError::rejected(created.return_message)
                .with_provider_code(created.return_code.to_string()));
        }

        let order_url = created
            .order_url
            .ok_or_else(|| ProviderError::rejected("ZaloPay order has no order_url"))?;

        Ok(CheckoutSession {
            external_reference: order_url,
            correlation_patch: CorrelationFields {
                app_trans_id: Some(fields.app_trans_id),
                ..Default::default()
            },
        })
    }

    async fn verify_inbound(&self, signal: &InboundSignal) -> Result<VerifiedOutcome, ProviderError> {
        match signal {
            InboundSignal::HmacCallback { body } => self.verify_callback(body),
            other => Err(ProviderError::malformed(format!(
                "ZaloPay cannot verify a {} signal",
                other.channel()
            ))),
        }
    }
}

/// `yyMMdd_<paymentCode>`, date in GMT+7.
fn app_trans_id(payment: &Payment, at: &Timestamp) -> String {
    format!("{}_{}", vietnam_local(at).format("%y%m%d"), payment.code)
}
