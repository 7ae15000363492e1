//! VNPay adapter (REDIRECT_IPN).
//!
//! Checkout is a signed redirect URL. Outcomes arrive twice: as a server IPN
//! and as the browser return. Both carry the same signed query and go through
//! the same verification.
//!
//! # Signing
//!
//! All `vnp_*` parameters except `vnp_SecureHash` and `vnp_SecureHashType`,
//! keys sorted, values form-URL-encoded, joined with `&`, HMAC-SHA512 keyed
//! by the hash secret, lower-case hex.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::Timestamp;
use crate::domain::payment::signature::{canonical_query, hmac_sha512_hex, signatures_equal};
use crate::domain::payment::{
    CorrelationFields, CorrelationKey, Currency, InboundSignal, Payment, PaymentCode,
    ProviderKind, ProviderOutcome, ReportedAmount, VerifiedOutcome,
};
use crate::ports::{CheckoutContext, CheckoutSession, ProviderAdapter, ProviderError};

use super::vietnam_local;

const VERSION: &str = "2.1.0";
const PARAM_PREFIX: &str = "vnp_";
const SECURE_HASH: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
const UNSIGNED_PARAMS: [&str; 2] = [SECURE_HASH, SECURE_HASH_TYPE];

/// Minutes a checkout URL stays payable.
const CHECKOUT_EXPIRY_MINUTES: i64 = 15;

const RESPONSE_OK: &str = "00";
const RESPONSE_CUSTOMER_CANCELLED: &str = "24";

/// VNPay merchant configuration.
#[derive(Clone)]
pub struct VnpayConfig {
    /// Terminal code assigned by VNPay.
    tmn_code: String,

    hash_secret: SecretString,

    /// Payment page, e.g. `https://sandbox.vnpayment.vn/paymentv2/vpcpay.html`.
    pay_url: String,

    /// Where VNPay sends the buyer's browser afterwards.
    return_url: String,
}

impl VnpayConfig {
    pub fn new(
        tmn_code: impl Into<String>,
        hash_secret: impl Into<String>,
        pay_url: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            tmn_code: tmn_code.into(),
            hash_secret: SecretString::new(hash_secret.into()),
            pay_url: pay_url.into(),
            return_url: return_url.into(),
        }
    }
}

/// VNPay adapter.
pub struct VnpayAdapter {
    config: VnpayConfig,
}

impl VnpayAdapter {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }

    fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let signing_string = canonical_query(params, PARAM_PREFIX, &UNSIGNED_PARAMS);
        hmac_sha512_hex(
            self.config.hash_secret.expose_secret().as_bytes(),
            signing_string.as_bytes(),
        )
    }

    /// Builds the signed payment URL for `payment`, created at `now`.
    fn checkout_url(&self, payment: &Payment, context: &CheckoutContext, now: Timestamp) -> String {
        let mut params = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            params.insert(key.to_string(), value);
        };
        put("vnp_Version", VERSION.to_string());
        put("vnp_Command", "pay".to_string());
        put("vnp_TmnCode", self.config.tmn_code.clone());
        put("vnp_Amount", (payment.amount * 100).to_string());
        put("vnp_CurrCode", "VND".to_string());
        put("vnp_TxnRef", payment.code.to_string());
        put(
            "vnp_OrderInfo",
            format!("Thanh toan goi {} {}", context.package_name, payment.code),
        );
        put("vnp_OrderType", "other".to_string());
        put(
            "vnp_Locale",
            context.locale.clone().unwrap_or_else(|| "vn".to_string()),
        );
        put("vnp_ReturnUrl", self.config.return_url.clone());
        put("vnp_IpAddr", context.client_ip.clone());
        put("vnp_CreateDate", vnpay_datetime(&now));
        put(
            "vnp_ExpireDate",
            vnpay_datetime(&now.add_minutes(CHECKOUT_EXPIRY_MINUTES)),
        );
        if let Some(bank_code) = &context.bank_code {
            put("vnp_BankCode", bank_code.clone());
        }

        let signature = self.sign(&params);
        format!(
            "{}?{}&{}={}",
            self.config.pay_url,
            canonical_query(&params, PARAM_PREFIX, &[]),
            SECURE_HASH,
            signature
        )
    }

    fn verify_query(&self, params: &BTreeMap<String, String>) -> Result<VerifiedOutcome, ProviderError> {
        let provided = params
            .get(SECURE_HASH)
            .ok_or_else(|| ProviderError::invalid_signature("missing vnp_SecureHash"))?;

        let expected = self.sign(params);
        if !signatures_equal(&expected, provided) {
            tracing::warn!(
                txn_ref = params.get("vnp_TxnRef").map(String::as_str).unwrap_or(""),
                "VNPay signature mismatch"
            );
            return Err(ProviderError::invalid_signature("vnp_SecureHash does not match"));
        }

        let txn_ref = required(params, "vnp_TxnRef")?;
        let code = PaymentCode::parse(txn_ref)
            .map_err(|e| ProviderError::malformed(format!("vnp_TxnRef: {}", e)))?;

        let amount: i64 = required(params, "vnp_Amount")?
            .parse()
            .map_err(|_| ProviderError::malformed("vnp_Amount is not an integer"))?;

        let response_code = required(params, "vnp_ResponseCode")?;
        let transaction_status = params.get("vnp_TransactionStatus").map(String::as_str);

        Ok(VerifiedOutcome {
            correlation_key: CorrelationKey::PaymentCode(code),
            outcome: interpret_response(response_code, transaction_status),
            reported_amount: Some(ReportedAmount::from_hundredths(Currency::Vnd, amount)),
            correlation_patch: CorrelationFields {
                transaction_no: non_empty(params.get("vnp_TransactionNo")),
                response_code: Some(response_code.to_string()),
                bank_code: non_empty(params.get("vnp_BankCode")),
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl ProviderAdapter for VnpayAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RedirectIpn
    }

    async fn create_checkout(
        &self,
        payment: &Payment,
        context: &CheckoutContext,
    ) -> Result<CheckoutSession, ProviderError> {
        Ok(CheckoutSession {
            external_reference: self.checkout_url(payment, context, Timestamp::now()),
            correlation_patch: CorrelationFields::default(),
        })
    }

    async fn verify_inbound(&self, signal: &InboundSignal) -> Result<VerifiedOutcome, ProviderError> {
        match signal {
            InboundSignal::RedirectIpn { params } => self.verify_query(params),
            other => Err(ProviderError::malformed(format!(
                "VNPay cannot verify a {} signal",
                other.channel()
            ))),
        }
    }
}

/// `yyyyMMddHHmmss` in GMT+7.
fn vnpay_datetime(at: &Timestamp) -> String {
    vietnam_local(at).format("%Y%m%d%H%M%S").to_string()
}

fn interpret_response(response_code: &str, transaction_status: Option<&str>) -> ProviderOutcome {
    match (response_code, transaction_status) {
        (RESPONSE_OK, Some(RESPONSE_OK)) => ProviderOutcome::Success,
        (RESPONSE_CUSTOMER_CANCELLED, _) => ProviderOutcome::Canceled,
        _ => ProviderOutcome::Failed,
    }
}

fn required<'a>(params: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, ProviderError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::malformed(format!("missing {}", key)))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
