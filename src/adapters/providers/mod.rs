//! Payment gateway adapters.
//!
//! One `ProviderAdapter` per gateway:
//!
//! - `vnpay` - REDIRECT_IPN, HMAC-SHA512 signed query strings
//! - `paypal` - OAUTH_REST, client-credentials API with webhook verification
//! - `zalopay` - HMAC_CALLBACK, HMAC-SHA256 order and callback MACs
//! - `google_play` - IAP, purchase tokens checked through a `PurchaseValidator`

mod google_play;
mod paypal;
mod vnpay;
mod zalopay;

pub use google_play::{GooglePlayAdapter, GooglePlayConfig, HttpPurchaseValidator};
pub use paypal::{PaypalAdapter, PaypalConfig};
pub use vnpay::{VnpayAdapter, VnpayConfig};
pub use zalopay::{ZalopayAdapter, ZalopayConfig};

use chrono::{Duration, NaiveDateTime};

use crate::domain::foundation::Timestamp;

/// Both Vietnamese gateways expect local time (GMT+7) in their date fields.
const VIETNAM_UTC_OFFSET_HOURS: i64 = 7;

fn vietnam_local(at: &Timestamp) -> NaiveDateTime {
    at.as_datetime().naive_utc() + Duration::hours(VIETNAM_UTC_OFFSET_HOURS)
}
