//! Payment provider kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// The external gateway a payment is routed through.
///
/// Each kind names the protocol family; the concrete gateway is noted per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    /// Browser redirect plus server IPN, HMAC-SHA512 signed query strings (VNPay).
    RedirectIpn,

    /// OAuth2 client-credentials REST API with webhooks (PayPal).
    OauthRest,

    /// JSON callback carrying a data blob and an HMAC-SHA256 MAC (ZaloPay).
    HmacCallback,

    /// Mobile in-app purchase token (Google Play Billing).
    Iap,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::RedirectIpn,
        ProviderKind::OauthRest,
        ProviderKind::HmacCallback,
        ProviderKind::Iap,
    ];

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::RedirectIpn => "redirect_ipn",
            ProviderKind::OauthRest => "oauth_rest",
            ProviderKind::HmacCallback => "hmac_callback",
            ProviderKind::Iap => "iap",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redirect_ipn" | "vnpay" => Ok(ProviderKind::RedirectIpn),
            "oauth_rest" | "paypal" => Ok(ProviderKind::OauthRest),
            "hmac_callback" | "zalopay" => Ok(ProviderKind::HmacCallback),
            "iap" | "google" | "google_play" => Ok(ProviderKind::Iap),
            other => Err(ValidationError::invalid_format(
                "provider",
                format!("unknown payment provider '{}'", other),
            )),
        }
    }
}
