//! Payment provider configuration
//!
//! Each provider section is optional. Only providers with a section are
//! registered at startup; checkouts and callbacks for the others answer
//! `PROVIDER_NOT_CONFIGURED`.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Payment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Fixed VND/USD rate for PayPal checkouts and amount checks.
    #[serde(default = "default_vnd_per_usd")]
    pub vnd_per_usd: f64,

    /// Bound on each outbound provider call and on signal verification.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    pub vnpay: Option<VnpaySection>,
    pub paypal: Option<PaypalSection>,
    pub zalopay: Option<ZalopaySection>,
    pub google_play: Option<GooglePlaySection>,
}

/// VNPay merchant settings (REDIRECT_IPN).
#[derive(Debug, Clone, Deserialize)]
pub struct VnpaySection {
    pub tmn_code: String,
    pub hash_secret: SecretString,

    #[serde(default = "default_vnpay_pay_url")]
    pub pay_url: String,

    pub return_url: String,
}

/// PayPal REST settings (OAUTH_REST).
#[derive(Debug, Clone, Deserialize)]
pub struct PaypalSection {
    pub client_id: String,
    pub client_secret: SecretString,
    pub webhook_id: String,

    #[serde(default = "default_paypal_api_base_url")]
    pub api_base_url: String,

    pub return_url: String,
    pub cancel_url: String,
}

/// ZaloPay merchant settings (HMAC_CALLBACK).
#[derive(Debug, Clone, Deserialize)]
pub struct ZalopaySection {
    pub app_id: i64,

    /// Signs order requests.
    pub key1: SecretString,

    /// Verifies callbacks.
    pub key2: SecretString,

    #[serde(default = "default_zalopay_create_order_url")]
    pub create_order_url: String,

    pub callback_url: String,
    pub redirect_url: String,
}

/// Google Play Developer API settings (IAP).
#[derive(Debug, Clone, Deserialize)]
pub struct GooglePlaySection {
    pub package_name: String,
    pub access_token: SecretString,

    #[serde(default = "default_google_play_api_base_url")]
    pub api_base_url: String,
}

impl PaymentConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.vnd_per_usd.is_finite() && self.vnd_per_usd > 0.0) {
            return Err(ValidationError::InvalidExchangeRate);
        }
        if self.provider_timeout_secs == 0 || self.provider_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.vnpay.is_none()
            && self.paypal.is_none()
            && self.zalopay.is_none()
            && self.google_play.is_none()
        {
            return Err(ValidationError::NoProviderConfigured);
        }

        if let Some(vnpay) = &self.vnpay {
            require("VNPAY__TMN_CODE", &vnpay.tmn_code)?;
            require_secret("VNPAY__HASH_SECRET", &vnpay.hash_secret)?;
            require_url("VNPAY__PAY_URL", &vnpay.pay_url)?;
            require_url("VNPAY__RETURN_URL", &vnpay.return_url)?;
        }
        if let Some(paypal) = &self.paypal {
            require("PAYPAL__CLIENT_ID", &paypal.client_id)?;
            require_secret("PAYPAL__CLIENT_SECRET", &paypal.client_secret)?;
            require("PAYPAL__WEBHOOK_ID", &paypal.webhook_id)?;
            require_url("PAYPAL__API_BASE_URL", &paypal.api_base_url)?;
            require_url("PAYPAL__RETURN_URL", &paypal.return_url)?;
            require_url("PAYPAL__CANCEL_URL", &paypal.cancel_url)?;
        }
        if let Some(zalopay) = &self.zalopay {
            if zalopay.app_id <= 0 {
                return Err(ValidationError::InvalidZalopayAppId);
            }
            require_secret("ZALOPAY__KEY1", &zalopay.key1)?;
            require_secret("ZALOPAY__KEY2", &zalopay.key2)?;
            require_url("ZALOPAY__CREATE_ORDER_URL", &zalopay.create_order_url)?;
            require_url("ZALOPAY__CALLBACK_URL", &zalopay.callback_url)?;
            require_url("ZALOPAY__REDIRECT_URL", &zalopay.redirect_url)?;
        }
        if let Some(google_play) = &self.google_play {
            require("GOOGLE_PLAY__PACKAGE_NAME", &google_play.package_name)?;
            require_secret("GOOGLE_PLAY__ACCESS_TOKEN", &google_play.access_token)?;
            require_url("GOOGLE_PLAY__API_BASE_URL", &google_play.api_base_url)?;
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            vnd_per_usd: default_vnd_per_usd(),
            provider_timeout_secs: default_provider_timeout(),
            vnpay: None,
            paypal: None,
            zalopay: None,
            google_play: None,
        }
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingRequired(name));
    }
    Ok(())
}

fn require_secret(name: &'static str, value: &SecretString) -> Result<(), ValidationError> {
    require(name, value.expose_secret())
}

fn require_url(name: &'static str, value: &str) -> Result<(), ValidationError> {
    require(name, value)?;
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::InvalidUrl(name)),
    }
}

fn default_vnd_per_usd() -> f64 {
    crate::domain::payment::DEFAULT_VND_PER_USD
}

fn default_provider_timeout() -> u64 {
    15
}

fn default_vnpay_pay_url() -> String {
    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
}

fn default_paypal_api_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_zalopay_create_order_url() -> String {
    "https://sb-openapi.zalopay.vn/v2/create".to_string()
}

fn default_google_play_api_base_url() -> String {
    "https://androidpublisher.googleapis.com".to_string()
}
